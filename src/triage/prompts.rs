//! Agent prompt text for each remediation action.

use chrono::{DateTime, Utc};

use crate::models::{Candidate, Note, PipelineJob};

/// Path, relative to the working copy, where the review flow expects its artifact.
pub const REVIEW_ARTIFACT: &str = ".medic/review.md";

/// One failed job and the tail of its log.
#[derive(Debug, Clone)]
pub struct FailedJobLog {
    pub job: PipelineJob,
    pub log: String,
}

fn header(candidate: &Candidate, target_branch: &str) -> String {
    format!(
        "You are working on request #{} \"{}\".\n\
         Source branch: {}\n\
         Target branch: {}\n\n",
        candidate.id, candidate.title, candidate.source_branch, target_branch
    )
}

/// Closing instruction pinning the message of every commit the agent makes.
fn commit_instructions(commit_message: &str) -> String {
    format!(
        "\nUse exactly this message for every commit you make, including merge commits \
         (for example `git commit -F <file>`):\n\n```\n{}\n```\n",
        commit_message.trim_end()
    )
}

pub fn conflict_prompt(candidate: &Candidate, target_branch: &str, commit_message: &str) -> String {
    let mut prompt = header(candidate, target_branch);
    prompt.push_str(&format!(
        "The branch has merge conflicts with origin/{target}. A merge of origin/{target} has been \
         started in this working copy and may have left conflict markers.\n\n\
         1. If no merge is in progress, run `git merge origin/{target}`.\n\
         2. Resolve every conflict marker, keeping the intent of both sides.\n\
         3. Make sure the project still builds and its tests pass.\n\
         4. Stage the resolved files and commit the merge when done.\n",
        target = target_branch
    ));
    prompt.push_str(&commit_instructions(commit_message));
    prompt
}

/// Review prompt with the full transcript, oldest first. Notes newer than the
/// bot's last action are flagged.
pub fn review_prompt(
    candidate: &Candidate,
    target_branch: &str,
    notes: &[Note],
    last_bot_action: DateTime<Utc>,
    commit_message: &str,
) -> String {
    let mut prompt = header(candidate, target_branch);
    prompt.push_str(
        "Reviewers left feedback on this request. Address every comment marked [NEW]; \
         older comments are context. Change the code accordingly and commit when done.\n\n\
         ## Discussion\n\n",
    );
    prompt.push_str(&transcript(notes, last_bot_action));
    prompt.push_str(&commit_instructions(commit_message));
    prompt
}

pub fn pipeline_prompt(
    candidate: &Candidate,
    target_branch: &str,
    pipeline_url: Option<&str>,
    failed: &[FailedJobLog],
    commit_message: &str,
) -> String {
    let mut prompt = header(candidate, target_branch);
    prompt.push_str("The CI pipeline for this branch failed.");
    if let Some(url) = pipeline_url {
        prompt.push_str(&format!(" Pipeline: {}", url));
    }
    prompt.push_str(
        "\n\nFind the root cause from the logs below, fix the code (not the pipeline \
         definition, unless it is clearly wrong), and commit when done.\n",
    );
    if failed.is_empty() {
        prompt.push_str("\nNo failed job logs could be retrieved.\n");
    }
    for entry in failed {
        prompt.push_str(&format!(
            "\n## Job `{}` (stage: {})\n\n```\n{}\n```\n",
            entry.job.name,
            entry.job.stage,
            entry.log.trim_end()
        ));
    }
    prompt.push_str(&commit_instructions(commit_message));
    prompt
}

/// Read-only review of a request; the findings go to [`REVIEW_ARTIFACT`].
pub fn review_only_prompt(candidate: &Candidate, target_branch: &str) -> String {
    let mut prompt = header(candidate, target_branch);
    prompt.push_str(&format!(
        "Review the changes on this branch against origin/{target}. Do not modify any \
         tracked file and do not commit. Write your findings as Markdown to `{artifact}` \
         (create the directory if needed): a short summary, then concrete issues with \
         file and line references.\n",
        target = target_branch,
        artifact = REVIEW_ARTIFACT
    ));
    prompt
}

fn transcript(notes: &[Note], last_bot_action: DateTime<Utc>) -> String {
    let mut ordered: Vec<&Note> = notes.iter().filter(|n| !n.system).collect();
    ordered.sort_by_key(|n| n.created_at);
    if ordered.is_empty() {
        return "(no discussion available)\n".to_string();
    }
    ordered
        .iter()
        .map(|n| {
            let flag = if n.created_at > last_bot_action { "[NEW] " } else { "" };
            format!(
                "{}{} at {}:\n{}\n",
                flag,
                n.author,
                n.created_at.to_rfc3339(),
                n.body.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
