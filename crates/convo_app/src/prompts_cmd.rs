use std::fs;

use anyhow::{anyhow, Context, Result};
use convo_engine::AtomicFileWriter;
use engine_logging::{engine_info, engine_warn};
use serde_json::Value;

use crate::cli::ExtractArgs;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractedPrompts {
    pub prompts: Vec<String>,
    pub skipped: usize,
}

/// Pulls `field` out of every JSON-lines object. Lines that are not objects, lack the field,
/// or hold a blank value are skipped. Embedded newlines become spaces so each prompt stays
/// on one line.
pub fn prompts_from_jsonl(raw: &str, field: &str) -> ExtractedPrompts {
    let mut out = ExtractedPrompts::default();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                engine_warn!("Line {} is not valid JSON: {err}", index + 1);
                out.skipped += 1;
                continue;
            }
        };
        let text = value
            .get(field)
            .and_then(Value::as_str)
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        if text.is_empty() {
            out.skipped += 1;
        } else {
            out.prompts.push(text);
        }
    }
    out
}

pub fn extract_prompts(args: &ExtractArgs) -> Result<usize> {
    let raw = fs::read_to_string(&args.src)
        .with_context(|| format!("reading {}", args.src.display()))?;
    let extracted = prompts_from_jsonl(&raw, &args.field);

    let file_name = args
        .dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("destination {} has no file name", args.dest.display()))?;
    let mut content = extracted.prompts.join("\n");
    content.push('\n');
    AtomicFileWriter::beside(&args.dest)
        .write(&file_name, &content)
        .with_context(|| format!("writing {}", args.dest.display()))?;

    engine_info!(
        "Wrote {} prompts to {} ({} lines skipped)",
        extracted.prompts.len(),
        args.dest.display(),
        extracted.skipped
    );
    Ok(extracted.prompts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::parse_prompts;
    use pretty_assertions::assert_eq;

    #[test]
    fn takes_the_named_field_and_skips_the_rest() {
        let raw = r#"{"sentence": "What is Rust?", "label": 1}
{"sentence": "  multi\nline  "}
not json
{"label": 2}
{"sentence": "   "}

{"question": "Other field"}"#;

        let extracted = prompts_from_jsonl(raw, "sentence");
        assert_eq!(
            extracted.prompts,
            vec!["What is Rust?".to_string(), "multi line".to_string()]
        );
        assert_eq!(extracted.skipped, 4);

        assert_eq!(prompts_from_jsonl(raw, "question").prompts, vec!["Other field".to_string()]);
    }

    #[test]
    fn written_file_parses_back_as_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.jsonl");
        let dest = dir.path().join("nested").join("train_input_prompts.txt");
        fs::write(&src, "{\"sentence\": \"a\"}\n{\"sentence\": \"b\"}\n").unwrap();

        let args = ExtractArgs {
            src,
            dest: dest.clone(),
            field: "sentence".to_string(),
        };
        assert_eq!(extract_prompts(&args).unwrap(), 2);
        let written = fs::read_to_string(dest).unwrap();
        assert_eq!(parse_prompts(&written), vec!["a".to_string(), "b".to_string()]);
    }
}
