//! Subcommand implementations.

use std::{collections::BTreeSet, io::Write, sync::Arc};

use ctxkey::{ContextKeyService, MemoryPreferences, Parsed, parse_with_diagnostics, read_map_file};
use serde_json::Value;
use tracing::debug;

use crate::{
    cli::{EvalArgs, RuleArgs},
    error::Result,
};

/// Parse a rule, echoing diagnostics to stderr.
fn parse(rule: &str) -> Parsed {
    let parsed = parse_with_diagnostics(rule);
    for diagnostic in &parsed.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }
    parsed
}

/// Split a `key=value` argument. Values that parse as JSON keep their type.
fn parse_assignment(raw: &str) -> (String, Value) {
    let (key, value) = raw.split_once('=').unwrap_or((raw, "true"));
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    (key.trim().to_string(), value)
}

/// Evaluate a rule against a scope built from files and `--set` entries.
pub fn eval(args: &EvalArgs, out: &mut impl Write) -> Result<()> {
    let prefs = match &args.prefs {
        Some(path) => MemoryPreferences::from_path(path)?,
        None => MemoryPreferences::new(),
    };
    let root = ContextKeyService::new(Arc::new(prefs));
    let scope = root.create_scoped(None)?;

    if let Some(path) = &args.context {
        for (key, value) in read_map_file(path)? {
            scope.set_context(&key, value);
        }
    }
    for raw in &args.set {
        let (key, value) = parse_assignment(raw);
        scope.set_context(&key, value);
    }

    let parsed = parse(&args.rule.rule);
    let matched = scope.context_matches_rules(parsed.expr.as_ref())?;
    debug!(rule = %args.rule.rule, matched, "eval");
    writeln!(out, "{}", matched)?;

    scope.dispose();
    root.dispose();
    Ok(())
}

/// Print the canonical form; an empty line means "no rule".
pub fn normalize(args: &RuleArgs, out: &mut impl Write) -> Result<()> {
    let parsed = parse(&args.rule);
    let text = parsed.expr.map(|e| e.serialize()).unwrap_or_default();
    writeln!(out, "{}", text)?;
    Ok(())
}

/// Print each referenced key once, in canonical order.
pub fn keys(args: &RuleArgs, out: &mut impl Write) -> Result<()> {
    let parsed = parse(&args.rule);
    let Some(expr) = parsed.expr else {
        return Ok(());
    };
    let mut seen = BTreeSet::new();
    for key in expr.keys() {
        if seen.insert(key) {
            writeln!(out, "{}", key)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, fs, path::PathBuf, process};

    use super::*;

    fn rule(text: &str) -> RuleArgs {
        RuleArgs {
            rule: text.to_string(),
        }
    }

    fn eval_args(text: &str) -> EvalArgs {
        EvalArgs {
            rule: rule(text),
            context: None,
            prefs: None,
            set: Vec::new(),
        }
    }

    fn run<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn scratch(name: &str, body: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("ctxkey-cli-{}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn normalize_prints_canonical_text() {
        let text = run(|out| normalize(&rule("!b && a && x == true"), out));
        assert_eq!(text, "a && x && !b\n");
        assert_eq!(run(|out| normalize(&rule(""), out)), "\n");
    }

    #[test]
    fn keys_are_listed_once() {
        let text = run(|out| keys(&rule("lang == 'go' && lang =~ /go/ && editorFocus"), out));
        assert_eq!(text, "editorFocus\nlang\n");
        assert_eq!(run(|out| keys(&rule(""), out)), "");
    }

    #[test]
    fn eval_uses_set_entries() {
        let mut args = eval_args("editorFocus && size == 14 && !inDebugMode");
        args.set = vec!["editorFocus".into(), "size=14".into()];
        assert_eq!(run(|out| eval(&args, out)), "true\n");
        args.set.push("inDebugMode=true".into());
        assert_eq!(run(|out| eval(&args, out)), "false\n");
    }

    #[test]
    fn eval_reads_context_and_preference_files() {
        let mut args = eval_args("lang =~ /go/i && config.editor.fontSize == 14");
        args.context = Some(scratch("ctx.json", r#"{"lang": "GOLANG"}"#));
        args.prefs = Some(scratch("prefs.ron", r#"{"editor": {"fontSize": 14}}"#));
        assert_eq!(run(|out| eval(&args, out)), "true\n");

        args.prefs = None;
        assert_eq!(run(|out| eval(&args, out)), "false\n");
    }

    #[test]
    fn eval_reports_missing_files() {
        let mut args = eval_args("a");
        args.context = Some(env::temp_dir().join("ctxkey-cli-does-not-exist.json"));
        let mut out = Vec::new();
        assert!(eval(&args, &mut out).is_err());
    }

    #[test]
    fn assignments_keep_json_types() {
        assert_eq!(parse_assignment("n=3"), ("n".into(), Value::from(3)));
        assert_eq!(parse_assignment("s=go"), ("s".into(), Value::from("go")));
        assert_eq!(parse_assignment("flag"), ("flag".into(), Value::Bool(true)));
    }
}
