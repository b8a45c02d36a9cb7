// Interview report: replay the finished conversation with a report-writing
// directive, render the markdown to PDF and store it next to the résumé.

pub mod generator;
pub mod handlers;
pub mod prompts;
