use crate::store::types::CollectionInfo;

pub const SUB_QUERY_PROMPT: &str = r#"To answer the question below thoroughly, break it down into at most ten sub-questions and return them as a list of strings.
If the question is simple enough that no breakdown helps, return a list holding only the original question.

Original question: {original_query}

<EXAMPLE>
Input:
"Explain deep learning"

Output:
[
    "What is deep learning?",
    "How does deep learning differ from machine learning?",
    "How did deep learning develop historically?"
]
</EXAMPLE>

Reply with the list of strings only:
"#;

pub fn sub_query_prompt(original_query: &str) -> String {
    SUB_QUERY_PROMPT.replace("{original_query}", original_query)
}

pub fn rerank_prompt(joined_queries: &str, chunk: &str) -> String {
    format!(
        r#"Given the query questions and one retrieved chunk, decide whether the chunk helps answer any of the questions. Reply with "YES" or "NO" only, nothing else.
Query questions: {joined_queries}
Retrieved chunk: {chunk}

Is the chunk helpful in answering any of the questions?
"#
    )
}

pub fn collection_route_prompt(question: &str, collections: &[CollectionInfo]) -> String {
    let info: Vec<serde_json::Value> = collections
        .iter()
        .map(|c| {
            serde_json::json!({
                "collection_name": c.name,
                "collection_description": c.description,
            })
        })
        .collect();
    format!(
        r#"Below are collection names with their descriptions. Select the collection names that may relate to the question and return them as a list of strings. If no collection relates to the question, return an empty list.

"QUESTION": {question}
"COLLECTION_INFO": {info}

Return ONLY the list of strings, with no other content. Selected collection names:
"#,
        question = question,
        info = serde_json::Value::Array(info),
    )
}

/// Chunks wrapped in numbered tags so the model can point at them.
pub fn chunk_block<S: AsRef<str>>(chunks: &[S]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("<chunk_{i}>\n{}\n</chunk_{i}>\n", chunk.as_ref()));
    }
    out
}

pub fn reflect_prompt<S: AsRef<str>>(question: &str, sub_queries: &[String], chunks: &[S]) -> String {
    format!(
        r#"Decide whether additional search queries are needed, given the original query, the sub-queries already searched and every chunk retrieved so far. If more research is needed, return a list of up to 3 new search queries. If not, return an empty list.

If the original query asks for a report, prefer proposing further queries over returning an empty list.

Original query: {question}
Previous sub-queries: {sub_queries:?}
Related chunks:
{chunks}
Reply with a list of strings only, no other text."#,
        question = question,
        sub_queries = sub_queries,
        chunks = chunk_block(chunks),
    )
}

pub fn final_answer_prompt<S: AsRef<str>>(question: &str, sub_queries: &[String], chunks: &[S]) -> String {
    format!(
        r#"# Research report

You are an expert research writer. Write an engaging, insightful research report on "{question}" using the information chunks below. It should read like the work of a thoughtful human expert, not a list of facts.

## Information
Sub-queries researched: {sub_queries:?}
Related chunks:
{chunks}
## How to write it

1. Structure (pyramid principle)
   - Open with the key conclusion: an executive summary of about 250 words.
   - Follow with 3-4 main sections that support that conclusion, main points first, details after.
   - Close with a forward-looking conclusion that reinforces the main message.
   - Connect sections and paragraphs with clear transitions.

2. Narrative
   - Establish the context and why the topic matters.
   - Explore the key themes in depth, with nuance.
   - End with insights the reader can carry away.

3. Depth and synthesis
   - Fewer ideas, treated in depth: two or three paragraphs per key concept.
   - Connect concepts across chunks rather than restating them one by one.
   - Give concrete examples, applications and implications; present other perspectives where they exist.

4. Presentation
   - Conversational but authoritative tone, fully developed paragraphs.
   - Two or three visual elements (Markdown tables or described diagrams).
   - Bullet points where they help: lists, features, steps.

5. Practical value
   For each major section, say why it matters, how it applies in practice, what its limits are and what to watch next.
"#,
        question = question,
        sub_queries = sub_queries,
        chunks = chunk_block(chunks),
    )
}

pub fn naive_summary_prompt<S: AsRef<str>>(question: &str, chunks: &[S]) -> String {
    format!(
        r#"You are an expert at analysing content. Using the retrieved chunks below, summarize a specific and detailed answer or report for the query.

Original query: {question}
Related chunks:
{chunks}"#,
        question = question,
        chunks = chunk_block(chunks),
    )
}
