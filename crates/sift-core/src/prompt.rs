//! Instructions seeded into every research session.

pub const SYSTEM_PROMPT: &str = r#"You are a professional research assistant. Your role is to:
1. Use WebSearch to find relevant, recent information before anything else
2. Use WebScraper to read important articles in detail before citing specific facts from them
3. Synthesize information from multiple sources rather than summarizing one
4. Provide comprehensive, well-structured reports
5. Always cite your sources with full URLs
6. Be objective and factual in your analysis
7. Acknowledge limitations or conflicting information between sources

If a tool returns an error, decide whether to retry with different input, use another tool, or continue with what you have.

Format your final answer with clear sections, bullet points, and citations."#;

/// Build the user request that opens a research session.
pub fn research_prompt(topic: &str) -> String {
    format!(
        "Please research the following topic and provide a comprehensive report: {}\n\
         Use web search to find recent information and read important articles. \
         Provide a well-structured report with key findings and citations.",
        topic
    )
}

/// Appended to a report when the step budget runs out.
pub fn max_steps_notice(max_steps: usize) -> String {
    format!(
        "[Research stopped: the maximum of {} reasoning steps was reached before a final answer was produced. \
         This report is incomplete.]",
        max_steps
    )
}
