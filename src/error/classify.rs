// Heuristic triage of script failures into error kinds
//
// Rules are evaluated in order and the first match wins. Text rules look at
// the lower-cased error message only and run before phase rules; the syntax
// rule runs after the dependency rule.

use serde::Serialize;

use super::ErrorKind;
use crate::script::ScriptError;

/// Coarse dispatch stage a failure was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    HandlerLoading,
    HandlerExecution,
}

const COMPILE_PHRASES: [&str; 2] = ["typescript", "type error"];
const DEPENDENCY_PHRASES: [&str; 3] = ["cannot resolve", "module not found", "cannot find module"];
const SYNTAX_PHRASES: [&str; 2] = ["syntaxerror", "unexpected token"];

pub fn classify(error: Option<&ScriptError>, phase: Option<Phase>) -> ErrorKind {
    let Some(error) = error else {
        return ErrorKind::InternalError;
    };
    let text = error.classification_text();
    let mentions = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    if mentions(&COMPILE_PHRASES) {
        return ErrorKind::CompileError;
    }
    if mentions(&DEPENDENCY_PHRASES) {
        return ErrorKind::DependencyError;
    }
    if mentions(&SYNTAX_PHRASES) {
        return ErrorKind::CompileError;
    }
    match phase {
        Some(Phase::HandlerExecution) => ErrorKind::HandlerExecutionFailed,
        Some(Phase::HandlerLoading) => ErrorKind::HandlerLoadFailed,
        None => ErrorKind::InternalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(name: &str, message: &str) -> ScriptError {
        ScriptError::new(name, message)
    }

    #[test]
    fn test_absent_error_is_internal() {
        assert_eq!(classify(None, Some(Phase::HandlerExecution)), ErrorKind::InternalError);
    }

    #[test]
    fn test_dependency_phrases() {
        let e = err("Error", "Module not found: xyz");
        assert_eq!(classify(Some(&e), Some(Phase::HandlerExecution)), ErrorKind::DependencyError);
        let e = err("Error", "Cannot find module './db.js'");
        assert_eq!(classify(Some(&e), Some(Phase::HandlerLoading)), ErrorKind::DependencyError);
    }

    #[test]
    fn test_syntax_phrases_are_compile_errors() {
        let e = err("Error", "Unexpected token '}' at line 3");
        assert_eq!(classify(Some(&e), Some(Phase::HandlerExecution)), ErrorKind::CompileError);
        let e = err("SyntaxError", "abrupt end").with_name_in_message();
        assert_eq!(classify(Some(&e), Some(Phase::HandlerLoading)), ErrorKind::CompileError);
    }

    #[test]
    fn test_error_name_is_not_matched() {
        // JSON.parse on a bad body raises a SyntaxError at run time
        let e = err("SyntaxError", "key must be a string at line 1 column 2");
        assert_eq!(
            classify(Some(&e), Some(Phase::HandlerExecution)),
            ErrorKind::HandlerExecutionFailed
        );
        let e = err("TypeScriptError", "x is not a function");
        assert_eq!(classify(Some(&e), Some(Phase::HandlerLoading)), ErrorKind::HandlerLoadFailed);
    }

    #[test]
    fn test_rule_order_is_preserved() {
        // compile beats dependency
        let e = err("Error", "type error while resolving: module not found");
        assert_eq!(classify(Some(&e), None), ErrorKind::CompileError);
        // dependency beats syntax
        let e = err("SyntaxError", "cannot resolve import").with_name_in_message();
        assert_eq!(classify(Some(&e), None), ErrorKind::DependencyError);
    }

    #[test]
    fn test_phase_fallbacks() {
        let e = err("TypeError", "x is not a function");
        assert_eq!(
            classify(Some(&e), Some(Phase::HandlerExecution)),
            ErrorKind::HandlerExecutionFailed
        );
        assert_eq!(classify(Some(&e), Some(Phase::HandlerLoading)), ErrorKind::HandlerLoadFailed);
        assert_eq!(classify(Some(&e), None), ErrorKind::InternalError);
    }
}
