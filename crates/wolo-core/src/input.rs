// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Initial prompt assembly for the CLI entry point.

/// Combine piped stdin and a positional prompt into the initial user
/// message.
///
/// With both present, stdin becomes context and the argument becomes the
/// task, joined by a fixed template.  With only one present, it is used
/// as-is.  Returns `None` when there is no input at all.
pub fn compose_prompt(stdin: Option<&str>, prompt: Option<&str>) -> Option<String> {
    let stdin = stdin.map(str::trim_end).filter(|s| !s.is_empty());
    let prompt = prompt.map(str::trim).filter(|s| !s.is_empty());
    match (stdin, prompt) {
        (Some(context), Some(task)) => Some(format!(
            "## Context (from stdin)\n\n{context}\n\n---\n\n## Task\n\n{task}"
        )),
        (Some(context), None) => Some(context.to_string()),
        (None, Some(task)) => Some(task.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_input_uses_the_exact_template() {
        let composed = compose_prompt(Some("context line"), Some("task line")).unwrap();
        assert_eq!(
            composed,
            "## Context (from stdin)\n\ncontext line\n\n---\n\n## Task\n\ntask line"
        );
    }

    #[test]
    fn prompt_only_passes_through() {
        assert_eq!(
            compose_prompt(None, Some("just do it")).as_deref(),
            Some("just do it")
        );
    }

    #[test]
    fn stdin_only_passes_through() {
        assert_eq!(
            compose_prompt(Some("piped body\n"), None).as_deref(),
            Some("piped body")
        );
    }

    #[test]
    fn empty_everything_is_none() {
        assert_eq!(compose_prompt(None, None), None);
        assert_eq!(compose_prompt(Some("  \n"), Some("")), None);
    }

    #[test]
    fn trailing_newlines_from_the_pipe_are_trimmed() {
        let composed = compose_prompt(Some("ctx\n\n"), Some("task")).unwrap();
        assert!(composed.contains("\n\nctx\n\n---"));
    }
}
