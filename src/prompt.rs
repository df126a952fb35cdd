//! Prompt assembly and response cleanup
//!
//! Plain-text prompt builders for each agent role, plus helpers that strip
//! model reasoning blocks and markdown fences from raw completions. Prompt
//! wording is deliberately simple; quality tuning is out of scope.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::RunMode;

fn mode_label(mode: RunMode) -> &'static str {
    match mode {
        RunMode::ResearchOnly => "a research report",
        RunMode::CodeOnly => "working code",
        RunMode::Both => "a research report and working code",
    }
}

/// Planner: initial plan or revision with human guidance and critic feedback
pub fn plan_prompt(
    topic: &str,
    digest: &str,
    mode: RunMode,
    guidance: Option<&str>,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are the principal investigator of a research lab.\n\
         Topic: {}\n\
         Deliverable: {}\n\n\
         Using the source material below, produce a numbered step-by-step plan.\n\
         One step per line. No commentary outside the steps.\n\n\
         Sources:\n{}\n",
        topic,
        mode_label(mode),
        digest
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nFeedback from the previous iteration to address:\n{}\n",
            feedback
        ));
    }
    if let Some(guidance) = guidance {
        prompt.push_str(&format!(
            "\nThe human reviewer rejected the previous plan and asked for:\n{}\n",
            guidance
        ));
    }
    prompt
}

/// Planner: explain how requested changes were incorporated
pub fn plan_reasoning_prompt(changes: &str, topic: &str) -> String {
    format!(
        "Briefly explain how the following requested changes were incorporated \
         into the research plan for '{}':\n{}",
        topic, changes
    )
}

/// Drafting: first draft of the research document
pub fn draft_prompt(topic: &str, plan: &str, digest: &str) -> String {
    format!(
        "Write a well-structured research report on '{}'.\n\
         Follow this plan:\n{}\n\n\
         Ground every claim in these sources:\n{}\n\n\
         Output the report text only.",
        topic, plan, digest
    )
}

/// Drafting: improve an existing draft from critic feedback
pub fn improve_draft_prompt(draft: &str, feedback: &str) -> String {
    format!(
        "Improve the research report below. Address every point of feedback \
         while keeping the structure intact.\n\nFeedback:\n{}\n\nReport:\n{}",
        feedback, draft
    )
}

/// CodeWriter: coding plan preceding code generation
pub fn coding_plan_prompt(topic: &str, plan: &str, digest: &str) -> String {
    format!(
        "Produce a short implementation plan for code that addresses '{}'.\n\
         Research plan:\n{}\n\nSources:\n{}\n\n\
         List the files, functions, and checks you will produce.",
        topic, plan, digest
    )
}

/// CodeWriter: revise the coding plan from human feedback
pub fn improve_coding_plan_prompt(coding_plan: &str, feedback: &str) -> String {
    format!(
        "Revise this implementation plan according to the feedback.\n\n\
         Feedback:\n{}\n\nPlan:\n{}",
        feedback, coding_plan
    )
}

/// CodeWriter: produce the runnable script
pub fn write_code_prompt(topic: &str, plan: &str, coding_plan: &str, digest: &str) -> String {
    format!(
        "Write a single self-contained Python script for '{}'.\n\
         Research plan:\n{}\n\nImplementation plan:\n{}\n\nSources:\n{}\n\n\
         Return only the code inside one fenced block.",
        topic, plan, coding_plan, digest
    )
}

/// CodeWriter: improve code from critic feedback
pub fn improve_code_prompt(code: &str, feedback: &str) -> String {
    format!(
        "Improve the script below according to the feedback. Return only the \
         full revised code inside one fenced block.\n\n\
         Feedback:\n{}\n\nScript:\n{}",
        feedback, code
    )
}

/// Reviewer: analyze a failed execution
pub fn review_analysis_prompt(code: &str, transcript: &str) -> String {
    format!(
        "The script below failed to execute. Identify the root cause.\n\n\
         Script:\n{}\n\nExecution transcript:\n{}",
        code, transcript
    )
}

/// Reviewer: produce a fixed script from the analysis
pub fn review_fix_prompt(code: &str, transcript: &str, analysis: &str) -> String {
    format!(
        "Fix the script based on this failure analysis. Return only the full \
         corrected code inside one fenced block.\n\n\
         Analysis:\n{}\n\nExecution transcript:\n{}\n\nScript:\n{}",
        analysis, transcript, code
    )
}

/// Critic: critique the research document against sources
pub fn critique_document_prompt(report: &str, digest: &str) -> String {
    format!(
        "Critique this research report against its sources. Point out gaps, \
         unsupported claims, and missing analysis.\n\n\
         Sources:\n{}\n\nReport:\n{}",
        digest, report
    )
}

/// Critic: critique the code and its execution outcome
pub fn critique_code_prompt(code: &str, transcript: &str, reasoning: Option<&str>) -> String {
    let mut prompt = format!(
        "Critique this script and its execution outcome. Point out \
         correctness and methodology issues.\n\n\
         Script:\n{}\n\nExecution transcript:\n{}",
        code, transcript
    );
    if let Some(reasoning) = reasoning {
        prompt.push_str(&format!("\n\nExecutor failure analysis:\n{}", reasoning));
    }
    prompt
}

/// Critic: fold both critiques into one actionable summary
pub fn critique_summary_prompt(report_feedback: &str, code_feedback: &str) -> String {
    format!(
        "Combine the following feedback into a short actionable summary for \
         the next iteration. End with exactly one line reading either \
         'RECOMMENDATION: continue' or 'RECOMMENDATION: stop'.\n\n\
         Report feedback:\n{}\n\nCode feedback:\n{}",
        report_feedback, code_feedback
    )
}

/// Executor: diagnose a failed execution from its streams
pub fn failure_reasoning_prompt(code: &str, stdout: &str, stderr: &str) -> String {
    format!(
        "This script failed. Explain the likely cause in a few sentences.\n\n\
         Script:\n{}\n\nStdout:\n{}\n\nStderr:\n{}",
        code, stdout, stderr
    )
}

/// Summarize raw quick-search results into an answer
pub fn quick_search_summary_prompt(query: &str, results: &str) -> String {
    format!(
        "Summarize these search results into a direct answer for the query \
         '{}':\n\n{}",
        query, results
    )
}

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:[a-zA-Z0-9_+-]*)\n(.*?)```").unwrap())
}

/// Remove `<think>...</think>` reasoning blocks from a completion
pub fn strip_reasoning(text: &str) -> String {
    think_block_re().replace_all(text, "").trim().to_string()
}

/// Extract executable code from a completion: reasoning blocks removed, the
/// first fenced block returned if present, otherwise the whole cleaned text
pub fn extract_code_block(text: &str) -> String {
    let cleaned = strip_reasoning(text);
    match code_fence_re().captures(&cleaned) {
        Some(caps) => caps[1].trim().to_string(),
        None => cleaned,
    }
}

/// Clean a report completion: reasoning blocks, markdown headers, and
/// horizontal rules removed
pub fn clean_report(text: &str) -> String {
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    static RULE_RE: OnceLock<Regex> = OnceLock::new();
    let header = HEADER_RE.get_or_init(|| Regex::new(r"(?m)^\s*#+\s*").unwrap());
    let rule = RULE_RE.get_or_init(|| Regex::new(r"(?m)^\s*-{3,}\s*$").unwrap());

    let text = strip_reasoning(text);
    let text = header.replace_all(&text, "");
    rule.replace_all(&text, "").trim().to_string()
}
