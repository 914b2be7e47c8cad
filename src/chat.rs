//! Retrieval-augmented query loop.
//!
//! Each turn reads one question, retrieves the closest records from the
//! index, assembles their leading characters into a context string, renders
//! the prompt template and prints the model's answer. The loop ends on an
//! exit token or end of input. A model failure ends it with an error.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::PromptConfig;
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::logging;
use crate::models::{truncate_chars, Exchange, SearchHit};
use crate::prompt::PromptTemplate;

const EXIT_TOKENS: [&str; 3] = ["exit", "quit", "q"];
const SEPARATOR: &str = "--------------------";

pub fn is_exit_command(line: &str) -> bool {
    let token = line.trim().to_lowercase();
    EXIT_TOKENS.contains(&token.as_str())
}

/// Joins the first `context_chars` characters of each hit with newlines,
/// in rank order. Empty when nothing but whitespace would be produced.
pub fn build_context(hits: &[SearchHit], context_chars: usize) -> String {
    let context = hits
        .iter()
        .map(|h| truncate_chars(&h.content, context_chars))
        .collect::<Vec<_>>()
        .join("\n");
    if context.trim().is_empty() {
        String::new()
    } else {
        context
    }
}

pub struct ChatSession<'a> {
    index: &'a VectorIndex,
    model: &'a dyn LanguageModel,
    template: PromptTemplate,
    context_chars: usize,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        index: &'a VectorIndex,
        model: &'a dyn LanguageModel,
        prompt: &PromptConfig,
    ) -> Result<Self> {
        Ok(Self {
            index,
            model,
            template: prompt.template()?,
            context_chars: prompt.context_chars,
        })
    }

    /// Answers one question.
    pub async fn ask(&self, question: &str) -> Result<Exchange> {
        let hits = self.index.search(question, self.index.default_k()).await?;
        tracing::info!("Found {} relevant documents.", hits.len());

        let context = build_context(&hits, self.context_chars);
        let values = HashMap::from([("question", question), ("context", context.as_str())]);
        let prompt = self.template.render(&values)?;
        tracing::debug!("Rendered prompt ({} chars)", prompt.chars().count());

        let answer = self
            .model
            .generate(&prompt)
            .await
            .with_context(|| format!("Model '{}' failed to answer", self.model.model_name()))?;

        Ok(Exchange {
            question: question.to_string(),
            hits,
            context,
            answer,
        })
    }

    /// Runs turns until an exit token or end of input. Returns the number of
    /// questions answered.
    pub async fn run<R, W>(&self, input: &mut R, out: &mut W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut answered = 0;
        let mut line = String::new();

        loop {
            writeln!(out, "\n{}\n", SEPARATOR)?;
            write!(out, "{}", logging::stamp("Ask a question: "))?;
            out.flush()?;

            line.clear();
            let read = input
                .read_line(&mut line)
                .await
                .context("Failed to read question")?;
            writeln!(out)?;
            if read == 0 {
                break;
            }

            if is_exit_command(&line) {
                break;
            }

            let exchange = self.ask(line.trim()).await?;
            writeln!(out, "{}", logging::stamp(&format!("Answer: {}", exchange.answer)))?;
            answered += 1;
        }

        Ok(answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{index_config, letter_vector, LetterEmbedder};
    use crate::models::EmbeddingRecord;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct RecordingModel {
        prompts: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl RecordingModel {
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            if self.fail {
                anyhow::bail!("model is down");
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Sprints are time-boxed.".to_string())
        }
    }

    fn hit(content: &str) -> SearchHit {
        SearchHit {
            id: content.chars().take(8).collect(),
            source: "/docs/a.pdf".to_string(),
            fragment_index: 0,
            content: content.to_string(),
            score: 0.5,
        }
    }

    fn prompt_config() -> PromptConfig {
        PromptConfig {
            template: "Context:\n{context}\nQ: {question}".to_string(),
            ..PromptConfig::default()
        }
    }

    async fn seeded_index(tmp: &TempDir) -> VectorIndex {
        let index = VectorIndex::initialize(
            &index_config(tmp.path()),
            Box::new(LetterEmbedder::default()),
        )
        .await
        .unwrap();
        let records: Vec<EmbeddingRecord> = ["Scrum uses sprints.", "Kanban uses boards."]
            .iter()
            .enumerate()
            .map(|(i, text)| EmbeddingRecord {
                id: format!("r{}", i),
                source: format!("/docs/{}.txt", i),
                fragment_index: 0,
                content: text.to_string(),
                content_hash: String::new(),
                file_digest: format!("d{}", i),
                vector: letter_vector(text),
            })
            .collect();
        index.add_documents(&records).await.unwrap();
        index
    }

    #[test]
    fn test_exit_tokens() {
        for token in ["quit", "Quit", "q", "exit", "  EXIT \n", "Q"] {
            assert!(is_exit_command(token), "{:?}", token);
        }
        for other in ["", "quiet", "what is scrum?", "exit now"] {
            assert!(!is_exit_command(other), "{:?}", other);
        }
    }

    #[test]
    fn test_context_truncates_each_hit() {
        let long = "A".repeat(300);
        let context = build_context(&[hit(&long), hit("B")], 200);
        assert_eq!(context, format!("{}\nB", "A".repeat(200)));
    }

    #[test]
    fn test_context_empty_cases() {
        assert_eq!(build_context(&[], 200), "");
        assert_eq!(build_context(&[hit("   "), hit("\n")], 200), "");
    }

    #[tokio::test]
    async fn test_ask_renders_prompt_with_context() {
        let tmp = TempDir::new().unwrap();
        let index = seeded_index(&tmp).await;
        let model = RecordingModel::default();
        let session = ChatSession::new(&index, &model, &prompt_config()).unwrap();

        let exchange = session.ask("What are sprints?").await.unwrap();
        assert_eq!(exchange.hits.len(), 2);
        assert_eq!(exchange.answer, "Sprints are time-boxed.");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Context:\n"));
        assert!(prompts[0].contains("Scrum uses sprints."));
        assert!(prompts[0].ends_with("Q: What are sprints?"));
    }

    #[tokio::test]
    async fn test_exit_token_skips_model() {
        let tmp = TempDir::new().unwrap();
        let index = seeded_index(&tmp).await;
        let model = RecordingModel::default();
        let session = ChatSession::new(&index, &model, &prompt_config()).unwrap();

        let mut input: &[u8] = b"Quit\nWhat are sprints?\n";
        let mut out = Vec::new();
        let answered = session.run(&mut input, &mut out).await.unwrap();

        assert_eq!(answered, 0);
        assert_eq!(model.calls(), 0);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Ask a question: "));
        assert!(!printed.contains("Answer:"));
    }

    #[tokio::test]
    async fn test_end_of_input_terminates() {
        let tmp = TempDir::new().unwrap();
        let index = seeded_index(&tmp).await;
        let model = RecordingModel::default();
        let session = ChatSession::new(&index, &model, &prompt_config()).unwrap();

        let mut input: &[u8] = b"What are sprints?\nboards?";
        let mut out = Vec::new();
        let answered = session.run(&mut input, &mut out).await.unwrap();

        assert_eq!(answered, 2);
        assert_eq!(model.calls(), 2);
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Answer: Sprints are time-boxed.").count(), 2);
    }

    #[tokio::test]
    async fn test_blank_question_is_answered() {
        let tmp = TempDir::new().unwrap();
        let index = seeded_index(&tmp).await;
        let model = RecordingModel::default();
        let session = ChatSession::new(&index, &model, &prompt_config()).unwrap();

        let mut input: &[u8] = b"\n   \nquit\n";
        let mut out = Vec::new();
        let answered = session.run(&mut input, &mut out).await.unwrap();

        assert_eq!(answered, 2);
        assert_eq!(model.calls(), 2);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts.iter().all(|p| p.ends_with("Q: ")));
        assert!(prompts[0].contains("Scrum uses sprints."));
    }

    #[tokio::test]
    async fn test_model_failure_ends_loop() {
        let tmp = TempDir::new().unwrap();
        let index = seeded_index(&tmp).await;
        let model = RecordingModel {
            fail: true,
            ..RecordingModel::default()
        };
        let session = ChatSession::new(&index, &model, &prompt_config()).unwrap();

        let mut input: &[u8] = b"What are sprints?\nexit\n";
        let mut out = Vec::new();
        let err = session.run(&mut input, &mut out).await.unwrap_err();

        assert!(format!("{:#}", err).contains("model is down"));
        assert!(!String::from_utf8(out).unwrap().contains("Answer:"));
    }
}
