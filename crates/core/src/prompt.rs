use crate::models::RetrievalResult;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that answers questions based on the provided context from a document. \
Answer the question using only the context provided. \
If the context doesn't contain enough information to answer the question, say so. \
Be concise and accurate.";

pub const NO_CONTEXT_NOTICE: &str = "No relevant content was found in the document for this question.";

const SEGMENT_SEPARATOR: &str = "\n\n";

/// Joins retrieved segment texts in ranked order, at most `limit` of them.
pub fn context_block(result: &RetrievalResult, limit: usize) -> String {
    result
        .hits
        .iter()
        .take(limit)
        .map(|hit| hit.segment.text.as_str())
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

/// Grounded prompt for `query`. An empty result still produces a prompt,
/// with a notice in place of the context.
pub fn build_prompt(query: &str, result: &RetrievalResult, limit: usize) -> String {
    let context = if result.is_empty() {
        NO_CONTEXT_NOTICE.to_string()
    } else {
        context_block(result, limit)
    };

    format!("{SYSTEM_INSTRUCTION}\n\nContext:\n{context}\n\nQuestion: {query}\n\nAnswer:")
}
