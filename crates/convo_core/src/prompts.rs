use std::collections::HashSet;
use std::path::Path;

const PROMPT_FILE_SUFFIX: &str = "_input_prompts.txt";

/// One prompt per non-blank line, trimmed, in file order.
pub fn parse_prompts(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// `train_input_prompts.txt` -> `train`, `qa.txt` -> `qa`.
pub fn task_name_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(stem) = name.strip_suffix(PROMPT_FILE_SUFFIX) {
        return stem.to_string();
    }
    if let Some(stem) = name.strip_suffix(".txt") {
        return stem.to_string();
    }
    name
}

pub fn is_prompt_file_name(name: &str) -> bool {
    name.ends_with(PROMPT_FILE_SUFFIX)
}

/// Prompts not yet in `done`, compared by trimmed text, original order kept. A prompt listed
/// twice is pending once, at its first position.
pub fn pending_prompts(prompts: &[String], done: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    prompts
        .iter()
        .filter(|p| {
            let key = p.trim();
            !done.contains(key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn blank_lines_are_dropped() {
        let prompts = parse_prompts("  first \n\n\t\nsecond\n   ");
        assert_eq!(prompts, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn task_name_strips_known_suffixes() {
        assert_eq!(task_name_from_path(&PathBuf::from("/in/train_input_prompts.txt")), "train");
        assert_eq!(task_name_from_path(&PathBuf::from("qa.txt")), "qa");
        assert_eq!(task_name_from_path(&PathBuf::from("list.prompts")), "list.prompts");
    }

    #[test]
    fn repeated_prompts_are_pending_once() {
        let prompts: Vec<String> = ["a", "b", " a ", "c", "b"].iter().map(|p| p.to_string()).collect();
        let done: HashSet<String> = ["c".to_string()].into_iter().collect();
        assert_eq!(pending_prompts(&prompts, &done), vec!["a".to_string(), "b".to_string()]);
    }
}
