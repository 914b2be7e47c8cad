//! Prompt template rendering.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.
//! The declared input variables must be exactly the placeholders found in
//! the template, which is checked once when the template is built.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("placeholder {{{0}}} is not a declared input variable")]
    UndeclaredPlaceholder(String),
    #[error("input variable '{0}' is not used by the template")]
    UnusedVariable(String),
    #[error("no value supplied for input variable '{0}'")]
    MissingVariable(String),
    #[error("unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str, input_variables: &[String]) -> Result<Self, PromptError> {
        let segments = parse(template)?;

        let declared: BTreeSet<&str> = input_variables.iter().map(String::as_str).collect();
        let mut used = BTreeSet::new();
        for segment in &segments {
            if let Segment::Variable(name) = segment {
                if !declared.contains(name.as_str()) {
                    return Err(PromptError::UndeclaredPlaceholder(name.clone()));
                }
                used.insert(name.as_str());
            }
        }
        if let Some(unused) = declared.difference(&used).next() {
            return Err(PromptError::UnusedVariable(unused.to_string()));
        }

        Ok(Self { segments })
    }

    /// Substitutes every placeholder with its value.
    pub fn render(&self, values: &HashMap<&str, &str>) -> Result<String, PromptError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| PromptError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse(template: &str) -> Result<Vec<Segment>, PromptError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    match n {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(PromptError::UnbalancedBrace(pos)),
                        other => name.push(other),
                    }
                }
                if !closed {
                    return Err(PromptError::UnbalancedBrace(pos));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(PromptError::EmptyPlaceholder(pos));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            '}' => return Err(PromptError::UnbalancedBrace(pos)),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_substitutes_variables() {
        let t = PromptTemplate::new(
            "Context:\n{context}\n\nQ: {question}\nA:",
            &vars(&["question", "context"]),
        )
        .unwrap();
        let values = HashMap::from([("question", "What is Scrum?"), ("context", "a framework")]);
        assert_eq!(
            t.render(&values).unwrap(),
            "Context:\na framework\n\nQ: What is Scrum?\nA:"
        );
    }

    #[test]
    fn test_render_empty_context() {
        let t = PromptTemplate::new("[{context}] {question}", &vars(&["question", "context"]))
            .unwrap();
        let values = HashMap::from([("question", "q"), ("context", "")]);
        assert_eq!(t.render(&values).unwrap(), "[] q");
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let t = PromptTemplate::new("{{json}} {question}", &vars(&["question"])).unwrap();
        let values = HashMap::from([("question", "x")]);
        assert_eq!(t.render(&values).unwrap(), "{json} x");
    }

    #[test]
    fn test_repeated_placeholder() {
        let t = PromptTemplate::new("{question} / {question}", &vars(&["question"])).unwrap();
        let values = HashMap::from([("question", "again")]);
        assert_eq!(t.render(&values).unwrap(), "again / again");
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let err = PromptTemplate::new("{question} {history}", &vars(&["question"])).unwrap_err();
        assert_eq!(err, PromptError::UndeclaredPlaceholder("history".to_string()));
    }

    #[test]
    fn test_unused_variable_rejected() {
        let err =
            PromptTemplate::new("{question}", &vars(&["question", "context"])).unwrap_err();
        assert_eq!(err, PromptError::UnusedVariable("context".to_string()));
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(matches!(
            PromptTemplate::new("{question", &vars(&["question"])),
            Err(PromptError::UnbalancedBrace(0))
        ));
        assert!(matches!(
            PromptTemplate::new("a } b", &vars(&[])),
            Err(PromptError::UnbalancedBrace(2))
        ));
        assert!(matches!(
            PromptTemplate::new("{}", &vars(&[])),
            Err(PromptError::EmptyPlaceholder(0))
        ));
    }

    #[test]
    fn test_missing_value_on_render() {
        let t = PromptTemplate::new("{question}", &vars(&["question"])).unwrap();
        let err = t.render(&HashMap::new()).unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("question".to_string()));
    }
}
