// Mock interview conversation: lifecycle, turn relay and completion detection.
// All completion calls go through the injected `CompletionService`.

pub mod completion;
pub mod handlers;
pub mod lifecycle;
pub mod locks;
pub mod prompts;
pub mod relay;
pub mod stream;
