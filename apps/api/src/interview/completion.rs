/// Closing line the interviewer is instructed to say when the interview is over.
pub const COMPLETION_SENTINEL: &str =
    "Thank you for your time, we will get back to you with the results.";

/// True iff the assembled model turn contains the closing line verbatim.
///
/// Exact substring match: no case or whitespace normalization. A paraphrased
/// closing is not detected.
pub fn is_interview_complete(model_text: &str) -> bool {
    model_text.contains(COMPLETION_SENTINEL)
}
