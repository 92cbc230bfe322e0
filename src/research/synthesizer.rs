use futures::future::join_all;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, instrument, warn};

use super::analyst::Analyst;
use crate::config::Settings;
use crate::models::{OutlineEntry, Source};
use crate::prompts;
use crate::state::SharedState;
use crate::text::{cosine_similarity, extract_json, sentence_chunks, truncate_chars};
use crate::tools::{CompletionRequest, Services};

const REPORT_FAILED: &str = "# Report Generation Failed\n\nThe research outline could not be generated. Please try a different query or check logs.";
const EVIDENCE_SNIPPET_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Rewrite,
    Search,
}

/// The adversarial reviewer's verdict on a draft section.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub critique: String,
    pub action: ReviewAction,
    pub query: Option<String>,
}

/// Reads the reviewer's JSON. Anything unreadable is treated as a request to rewrite.
pub fn parse_review(raw: &str) -> Review {
    let parsed = extract_json(raw).and_then(|json| serde_json::from_str::<Value>(&json).ok());
    let Some(value) = parsed.filter(Value::is_object) else {
        warn!("Could not extract JSON from reflexion review. Defaulting to REWRITE.");
        return Review {
            critique: "No specific critique provided (or JSON parsing failed).".to_string(),
            action: ReviewAction::Rewrite,
            query: None,
        };
    };

    let action = match value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("REWRITE")
        .to_uppercase()
        .as_str()
    {
        "NONE" => ReviewAction::Approve,
        "SEARCH" => ReviewAction::Search,
        _ => ReviewAction::Rewrite,
    };
    Review {
        critique: value
            .get("critique")
            .and_then(Value::as_str)
            .unwrap_or("No specific critique provided.")
            .to_string(),
        action,
        query: value
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string),
    }
}

/// Removes a trailing "References", "Bibliography" or "Works Cited" section.
pub fn strip_reference_trailer(text: &str) -> String {
    static TRAILER: OnceLock<Regex> = OnceLock::new();
    let trailer = TRAILER.get_or_init(|| {
        Regex::new(
            r"(?im)\n[ \t]*(?:\*\*|#{1,6}[ \t]*)?(?:References|Bibliography|Works Cited)[ \t]*(?:\*\*)?:?(?:\*\*)?[ \t]*$[\s\S]*",
        )
        .expect("valid regex")
    });
    let cleaned = trailer.replace(text, "");
    if cleaned.len() < text.len() {
        info!("Cleaned a hallucinated bibliography from a generated section.");
    }
    cleaned.trim().to_string()
}

/// Rewrites `[Source N]` markers as `[N]`.
pub fn normalize_citations(text: &str) -> String {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| Regex::new(r"\[[Ss]ource\s*(\d+)\]").expect("valid regex"));
    marker.replace_all(text, "[$1]").into_owned()
}

/// Bibliography for every `[n]` cited in `text`, ascending.
pub fn make_bibliography(text: &str, sources: &[Source]) -> String {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    let citation = CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

    let cited: BTreeSet<usize> = citation
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse().ok())
        .collect();
    if cited.is_empty() {
        return "## Bibliography\n\nNo sources were cited in this report.".to_string();
    }

    let entries: Vec<String> = cited
        .into_iter()
        .map(|n| match n.checked_sub(1).and_then(|i| sources.get(i)) {
            Some(source) => format!("[{}] {}. <{}>", n, source.title, source.url),
            None => {
                warn!(
                    "Bibliography: cited source [{}] is out of bounds for {} sources.",
                    n,
                    sources.len()
                );
                format!("[{}] Reference information not available (index out of bounds).", n)
            }
        })
        .collect();

    format!("## Bibliography\n\n{}", entries.join("\n\n"))
}

/// Writes the final report: one cited section per outline topic, refined by reflexion.
pub struct Synthesizer {
    state: SharedState,
    services: Services,
    settings: Arc<Settings>,
    analyst: Arc<Analyst>,
}

impl Synthesizer {
    pub fn new(
        state: SharedState,
        services: Services,
        settings: Arc<Settings>,
        analyst: Arc<Analyst>,
    ) -> Self {
        Self {
            state,
            services,
            settings,
            analyst,
        }
    }

    #[instrument(skip(self))]
    pub async fn synthesize(&self) -> String {
        let (query, blocks): (String, Vec<OutlineEntry>) = {
            let state = self.state.read().await;
            let blocks = state
                .outline
                .iter()
                .filter(|entry| !entry.topic.trim().is_empty())
                .cloned()
                .collect();
            (state.query.clone(), blocks)
        };
        if blocks.is_empty() {
            error!("Cannot synthesize report: outline is empty or invalid.");
            return REPORT_FAILED.to_string();
        }

        let sections = join_all(blocks.iter().map(|block| self.synthesize_section(block))).await;
        let section_md = blocks
            .iter()
            .zip(sections)
            .map(|(block, text)| format!("## {}\n\n{}", block.topic, text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let title_request = CompletionRequest::new(prompts::REPORT_TITLE, query.clone())
            .temperature(0.3)
            .max_tokens(64);
        let abstract_request = CompletionRequest::new(
            prompts::REPORT_ABSTRACT,
            truncate_chars(&section_md, self.settings.max_abstract_context_chars),
        )
        .temperature(0.3)
        .max_tokens(400);
        let (title, abstract_text) = tokio::join!(
            self.services.reasoning.complete(title_request),
            self.services.reasoning.complete(abstract_request)
        );
        let title = match title {
            Ok(title) if !title.trim().is_empty() => title.trim().trim_matches('"').to_string(),
            _ => query,
        };
        let abstract_text = abstract_text
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|e| {
                warn!("Abstract generation failed: {}", e);
                "Abstract unavailable.".to_string()
            });

        let bibliography = {
            let state = self.state.read().await;
            make_bibliography(&section_md, &state.results)
        };
        format!(
            "# {}\n\n## Abstract\n\n{}\n\n{}\n\n{}",
            title, abstract_text, section_md, bibliography
        )
    }

    pub async fn synthesize_section(&self, block: &OutlineEntry) -> String {
        let topic = block.topic.as_str();
        info!("Synthesizing section: '{}'", topic);

        if self.state.read().await.chunks.is_empty() {
            return format!("No information found in the knowledge base for the topic: {}.", topic);
        }

        let document = self.analyst.hyde_document(&block.focus_query()).await;
        let Some(focus) = self.analyst.embed_texts(&[document]).await.pop().flatten() else {
            warn!("Could not embed query for section '{}'. Skipping synthesis.", topic);
            return format!("Could not process query for section: {}.", topic);
        };

        let (context, section_urls) = {
            let state = self.state.read().await;
            let mut ranked: Vec<(f32, &str, usize)> = state
                .embedded_chunks()
                .into_iter()
                .map(|(chunk, embedding)| {
                    (
                        cosine_similarity(&focus, embedding),
                        chunk.text.as_str(),
                        chunk.source_index,
                    )
                })
                .collect();
            if ranked.is_empty() {
                return format!("No embedded chunks available for synthesizing section: {}.", topic);
            }
            ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
            ranked.truncate(self.settings.top_k_results_per_section);

            let context: String = ranked
                .iter()
                .map(|(_, text, index)| format!("[Source {}]: {}\n\n", index + 1, text))
                .collect();
            let urls: HashSet<String> = ranked
                .iter()
                .filter_map(|(_, _, index)| state.results.get(*index))
                .map(|source| source.url.clone())
                .collect();
            (context, urls)
        };

        let request = CompletionRequest::new(
            prompts::SECTION_SYNTHESIZER,
            format!(
                "Topic: {}\nSubtopics to consider: {}\n\nExcerpts:\n{}",
                topic,
                block.subtopics.join(", "),
                context
            ),
        )
        .temperature(0.4)
        .max_tokens(1500);
        let draft = match self.services.reasoning.complete(request).await {
            Ok(draft) => strip_reference_trailer(&draft),
            Err(e) => {
                error!("LLM failed to synthesize section '{}': {}", topic, e);
                return format!("Failed to synthesize section: {}. LLM Error.", topic);
            }
        };

        let refined = self.reflexion(topic, draft, context, section_urls).await;
        normalize_citations(&refined)
    }

    /// Review and rewrite `draft` up to `max_reflexion_loops` times.
    async fn reflexion(
        &self,
        topic: &str,
        draft: String,
        mut context: String,
        mut section_urls: HashSet<String>,
    ) -> String {
        let mut current = draft;
        let loops = self.settings.max_reflexion_loops;

        for pass in 1..=loops {
            info!("Reflexion Pass {}/{} for section '{}'", pass, loops, topic);
            let request = CompletionRequest::new(
                prompts::REFLEXION_REVIEWER,
                format!("Topic: {}\n\nText to Review:\n{}", topic, current),
            )
            .temperature(0.4)
            .max_tokens(512);
            let review = match self.services.reasoning.complete(request).await {
                Ok(raw) => parse_review(&raw),
                Err(e) => {
                    error!("Reflexion reviewer failed: {}. Keeping current draft.", e);
                    return current;
                }
            };

            if review.action == ReviewAction::Approve {
                info!("Reflexion for '{}': no issues found.", topic);
                return current;
            }
            warn!("Reflexion for '{}' ({:?}): {}", topic, review.action, review.critique);

            let mut critique = review.critique;
            if review.action == ReviewAction::Search {
                match review.query {
                    Some(query) => {
                        let evidence = self.reflexion_search(&query, &mut section_urls).await;
                        if evidence.is_empty() {
                            critique.push_str("\n(Note: Reflexion search for more info was attempted but yielded no new usable content.)");
                        } else {
                            context.push_str("\n--- NEW EVIDENCE (from Reflexion Search) ---\n");
                            context.push_str(&evidence);
                            critique.push_str("\n(Note: New evidence has been found and added to the context for revision.)");
                        }
                    }
                    None => critique.push_str("\n(Note: Reviewer suggested SEARCH but no query was provided. Proceeding with REWRITE based on existing context.)"),
                }
            }

            let request = CompletionRequest::new(
                prompts::REFLEXION_REWRITER,
                format!(
                    "Topic: {}\n\nFull Context (Original + New Evidence if any):\n{}\n\nFlawed Draft:\n{}\n\nReviewer's Feedback:\n{}\n\nRevised Section:",
                    topic, context, current, critique
                ),
            )
            .temperature(0.4)
            .max_tokens(1500);
            match self.services.reasoning.complete(request).await {
                Ok(rewritten) => current = rewritten,
                Err(e) => {
                    error!("Reflexion rewriter failed: {}. Returning previous draft.", e);
                    return current;
                }
            }
        }

        info!("Finished reflexion for '{}' after {} loops.", topic, loops);
        current
    }

    /// Fetches up to `reflexion_search_results` new pages for `query` and adds
    /// them to the knowledge store. Returns the evidence block for the context.
    async fn reflexion_search(&self, query: &str, section_urls: &mut HashSet<String>) -> String {
        info!("Reflexion: searching for '{}'", query);
        let hits = self
            .services
            .search
            .search(query, self.settings.reflexion_search_results)
            .await;

        let fresh: Vec<_> = {
            let state = self.state.read().await;
            let mut seen = HashSet::new();
            hits.into_iter()
                .filter(|hit| {
                    !hit.url.is_empty()
                        && !state.is_registered(&hit.url)
                        && !section_urls.contains(&hit.url)
                        && seen.insert(hit.url.clone())
                })
                .collect()
        };
        if fresh.is_empty() {
            info!("Reflexion search: no new, unique URLs found.");
            return String::new();
        }

        let pages = join_all(fresh.iter().map(|hit| self.services.fetcher.fetch(&hit.url))).await;

        let mut evidence = String::new();
        for (hit, content) in fresh.iter().zip(pages) {
            if content.chars().count() <= self.settings.min_page_chars {
                info!("Reflexion: no useful content fetched from {}", hit.url);
                continue;
            }
            let chunks = sentence_chunks(&content, self.settings.chunk_sentences);
            let embeddings = self.analyst.embed_texts(&chunks).await;

            let index = {
                let mut state = self.state.write().await;
                if state.is_registered(&hit.url) {
                    // A concurrent section claimed this page first.
                    continue;
                }
                let title = if hit.title.trim().is_empty() {
                    "Untitled Reflexion Source"
                } else {
                    hit.title.as_str()
                };
                let index = state.register_source(&hit.url, title, &format!("reflexion: {}", query));
                let mut added = 0;
                for (text, embedding) in chunks.iter().zip(embeddings) {
                    if let Some(embedding) = embedding {
                        if state.add_chunk(text, index, embedding) {
                            added += 1;
                        }
                    }
                }
                info!("Reflexion: added {} chunks from new source: {}", added, hit.url);
                index
            };

            evidence.push_str(&format!(
                "\n[Source {}]: {}...\n",
                index + 1,
                truncate_chars(&content, EVIDENCE_SNIPPET_CHARS)
            ));
            section_urls.insert(hit.url.clone());
        }
        debug!("Reflexion evidence length: {}", evidence.len());
        evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, url: &str) -> Source {
        Source {
            url: url.to_string(),
            title: title.to_string(),
            query: "q".to_string(),
        }
    }

    #[test]
    fn bibliography_lists_cited_sources_in_order() {
        let sources: Vec<Source> = (1..=5)
            .map(|i| source(&format!("Title {}", i), &format!("https://s{}.example", i)))
            .collect();
        let text = "Claim [5]. Another [2]. Again [5].";
        assert_eq!(
            make_bibliography(text, &sources),
            "## Bibliography\n\n[2] Title 2. <https://s2.example>\n\n[5] Title 5. <https://s5.example>"
        );
    }

    #[test]
    fn bibliography_placeholder_for_unknown_indices() {
        let sources = vec![source("Only", "https://only.example")];
        let bib = make_bibliography("See [0] and [99] and [1].", &sources);
        assert!(bib.contains("[0] Reference information not available (index out of bounds)."));
        assert!(bib.contains("[1] Only. <https://only.example>"));
        assert!(bib.contains("[99] Reference information not available (index out of bounds)."));
    }

    #[test]
    fn bibliography_without_citations() {
        assert_eq!(
            make_bibliography("Nothing cited.", &[]),
            "## Bibliography\n\nNo sources were cited in this report."
        );
    }

    #[test]
    fn strips_hallucinated_reference_sections() {
        let text = "The telegraph spread quickly [Source 1].\n\n**References:**\n1. Some book";
        assert_eq!(strip_reference_trailer(text), "The telegraph spread quickly [Source 1].");

        let text = "Body text.\n## Works Cited\n- thing";
        assert_eq!(strip_reference_trailer(text), "Body text.");
    }

    #[test]
    fn keeps_inline_mentions_of_references() {
        let text = "The references in this field are sparse [Source 2].";
        assert_eq!(strip_reference_trailer(text), text);
    }

    #[test]
    fn citation_markers_are_normalized() {
        assert_eq!(
            normalize_citations("A [Source 3]. B [source 12]. C [Source12]. D [4]."),
            "A [3]. B [12]. C [12]. D [4]."
        );
    }

    #[test]
    fn review_parsing() {
        let review = parse_review(r#"{"critique": "Looks good.", "action": "none"}"#);
        assert_eq!(review.action, ReviewAction::Approve);

        let review = parse_review(
            r#"```json
{"critique": "Missing dates.", "action": "SEARCH", "query": "first transatlantic cable date"}
```"#,
        );
        assert_eq!(review.action, ReviewAction::Search);
        assert_eq!(review.query.as_deref(), Some("first transatlantic cable date"));

        let review = parse_review("The text is vague.");
        assert_eq!(review.action, ReviewAction::Rewrite);
    }
}
