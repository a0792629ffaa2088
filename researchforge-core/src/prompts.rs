//! Instruction text and request bodies for each prompt template.
//!
//! A template renders to a system instruction plus a user message. Request
//! bodies are Handlebars templates referencing context fields as `{{name}}`.
//! Values are inserted verbatim; fields that are not supplied render as empty
//! strings.

use crate::brain::{ContextFields, PromptTemplate};
use handlebars::{Handlebars, RenderError};

/// A template rendered against concrete context fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Render `template` with `fields`.
pub fn render(template: PromptTemplate, fields: &ContextFields) -> Result<RenderedPrompt, RenderError> {
    Ok(RenderedPrompt {
        system: instruction(template).to_string(),
        user: substitute(request_body(template), fields)?,
    })
}

/// Role instructions sent as the system message.
pub fn instruction(template: PromptTemplate) -> &'static str {
    match template {
        PromptTemplate::PaperDiscovery => {
            "You are a paper discovery specialist. Select the most relevant academic \
             papers for a research topic. Prefer peer-reviewed venues, seminal work, and \
             papers from the last five years. Never invent papers, authors, or URLs. \
             Respond with a JSON array only."
        }
        PromptTemplate::PaperAnalysis => {
            "You are a paper analysis specialist. For each paper, state the research \
             question, the methodology, the key findings, and the limitations the authors \
             acknowledge. Base the analysis on the supplied abstract and full-text excerpt. \
             Respond with a JSON array only, one object per paper, in the order given."
        }
        PromptTemplate::Synthesis => {
            "You are a literature synthesis specialist. Combine paper analyses into one \
             structured literature review with the sections Introduction, Major Themes, \
             Methodological Approaches, Key Findings, Research Gaps, and Conclusion. Cite \
             every claim in (Author, Year) form. Write clear academic prose."
        }
        PromptTemplate::Refinement => {
            "You are a quality assurance editor for literature reviews. Rewrite the draft \
             to address every point of the evaluation feedback while keeping correct \
             content and citations intact. Return only the full revised review text."
        }
        PromptTemplate::Evaluation => {
            "You are a strict reviewer of literature reviews. Score the draft on five \
             criteria (structure, length, citations, coverage, clarity), each an integer \
             from 0 to 2, and report the total as their sum. Respond with a JSON object only."
        }
    }
}

fn request_body(template: PromptTemplate) -> &'static str {
    match template {
        PromptTemplate::PaperDiscovery => {
            "Find {{breadth}} highly relevant academic papers about: {{topic}}\n\n\
             Search results to choose from (may be empty):\n{{candidates}}\n\n\
             For each paper give the full title, all authors, publication year, venue, \
             landing URL and direct PDF URL when known.\n\
             Return a JSON array of objects with the keys \
             \"title\", \"authors\", \"year\", \"venue\", \"url\", \"pdf_url\", \"abstract\"."
        }
        PromptTemplate::PaperAnalysis => {
            "Research topic: {{topic}}\n\nPapers:\n{{papers}}\n\n\
             Return a JSON array with one object per paper using the keys \
             \"title\", \"summary\", \"research_question\", \"methodology\", \
             \"key_findings\" (array), \"limitations\" (array)."
        }
        PromptTemplate::Synthesis => {
            "Write a literature review about {{topic}}.\n\n\
             Paper analyses:\n{{analyses}}\n\n\
             References:\n{{references}}\n\n\
             Aim for {{target_words}} words."
        }
        PromptTemplate::Refinement => {
            "Topic: {{topic}}\n\n\
             Current score: {{score}}/10 (structure {{structure}}, length {{length}}, \
             citations {{citations}}, coverage {{coverage}}, clarity {{clarity}}).\n\
             Feedback:\n{{feedback}}\n\n\
             Required improvements:\n{{improvements}}\n\n\
             Draft (version {{version}}):\n{{draft}}"
        }
        PromptTemplate::Evaluation => {
            "Papers the review must cover:\n{{titles}}\n\n\
             Draft:\n{{draft}}\n\n\
             Return a JSON object with the keys \"structure\", \"length\", \"citations\", \
             \"coverage\", \"clarity\", \"total\", \"feedback\" (string) and \
             \"improvements\" (array of strings)."
        }
    }
}

fn substitute(body: &str, fields: &ContextFields) -> Result<String, RenderError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.render_template(body, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_fields() {
        let fields = ContextFields::new()
            .with("topic", "diffusion models")
            .with("breadth", 3)
            .with("candidates", "[]");
        let prompt = render(PromptTemplate::PaperDiscovery, &fields).unwrap();
        assert!(prompt.user.starts_with("Find 3 highly relevant academic papers about: diffusion models"));
        assert!(prompt.system.contains("JSON array"));
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let prompt = render(PromptTemplate::Synthesis, &ContextFields::new()).unwrap();
        assert!(prompt.user.starts_with("Write a literature review about .\n"));
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let fields = ContextFields::new().with("x", "<b> & \"quoted\"");
        assert_eq!(
            substitute("{ \"a\": {{x}} }", &fields).unwrap(),
            "{ \"a\": <b> & \"quoted\" }"
        );
    }

    #[test]
    fn test_field_values_are_not_reparsed() {
        let fields = ContextFields::new()
            .with("draft", "uses {{topic}} literally")
            .with("topic", "graphs");
        let prompt = render(PromptTemplate::Evaluation, &fields).unwrap();
        assert!(prompt.user.contains("Draft:\nuses {{topic}} literally"));
    }
}
