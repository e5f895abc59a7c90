use crate::error::{RagError, Result};
use crate::store::ScoredChunk;

/// Instructions of the default concise question-answering prompt
const DEFAULT_INSTRUCTIONS: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A prompt template with `{context}` and `{question}` placeholders.
///
/// The template is parsed once; `{{` and `}}` stand for literal braces.
/// Parsing fails on unknown placeholders, unbalanced braces, or when either
/// placeholder is missing, so rendering itself cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(RagError::config("unclosed '{' in prompt template"))
                            }
                            Some(ch) => name.push(ch),
                        }
                    }

                    let segment = match name.as_str() {
                        "context" => Segment::Context,
                        "question" => Segment::Question,
                        other => {
                            return Err(RagError::config(format!(
                                "unknown placeholder {{{}}} in prompt template",
                                other
                            )))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => return Err(RagError::config("unmatched '}' in prompt template")),
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (segment, name) in [(Segment::Context, "context"), (Segment::Question, "question")] {
            if !segments.contains(&segment) {
                return Err(RagError::config(format!(
                    "prompt template is missing the {{{}}} placeholder",
                    name
                )));
            }
        }

        Ok(PromptTemplate { segments })
    }

    /// Fill the placeholders
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut prompt = String::with_capacity(context.len() + question.len() + 256);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Context => prompt.push_str(context),
                Segment::Question => prompt.push_str(question),
            }
        }
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate {
            segments: vec![
                Segment::Literal(format!("{}\nQuestion: ", DEFAULT_INSTRUCTIONS)),
                Segment::Question,
                Segment::Literal(" \nContext: ".to_string()),
                Segment::Context,
                Segment::Literal(" \nAnswer:".to_string()),
            ],
        }
    }
}

/// Join retrieved chunk texts, best match first
pub fn build_context(chunks: &[ScoredChunk], separator: &str) -> String {
    chunks
        .iter()
        .map(|scored| scored.chunk.text.as_str())
        .collect::<Vec<&str>>()
        .join(separator)
}
