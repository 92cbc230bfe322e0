use std::env;
use std::str::FromStr;

/// Tunables for a research session.
///
/// Defaults match the values the engine was calibrated with; every field can be
/// overridden through an environment variable of the same name in upper case.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chat_model: String,
    pub agent_summary_model: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub max_embed_chars: usize,

    pub search_results: usize,
    pub reflexion_search_results: usize,
    pub top_k_results_per_section: usize,

    pub max_cycles: usize,
    pub boot_queries: usize,
    pub chunk_sentences: usize,
    pub min_page_chars: usize,
    pub max_page_chars: usize,
    pub max_abstract_context_chars: usize,
    pub outline_context_chunks: usize,

    pub pca_components: usize,
    pub n_clusters: usize,
    pub kmeans_seed: u64,
    pub latent_novelty_threshold: f32,
    pub novelty_alpha: f32,
    pub novelty_top_k: usize,
    pub diminishing_returns_threshold: f32,
    pub diminishing_returns_window: usize,
    pub max_reflexion_loops: usize,
    pub enable_exploration: bool,

    pub embed_cache_capacity: usize,
    pub content_cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".to_string(),
            agent_summary_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_batch_size: 16,
            max_embed_chars: 8_191,

            search_results: 8,
            reflexion_search_results: 2,
            top_k_results_per_section: 12,

            max_cycles: 5,
            boot_queries: 3,
            chunk_sentences: 4,
            min_page_chars: 100,
            max_page_chars: 40_000,
            max_abstract_context_chars: 10_000,
            outline_context_chunks: 50,

            pca_components: 10,
            n_clusters: 8,
            kmeans_seed: 42,
            latent_novelty_threshold: 0.65,
            novelty_alpha: 0.65,
            novelty_top_k: 15,
            diminishing_returns_threshold: 0.005,
            diminishing_returns_window: 2,
            max_reflexion_loops: 2,
            enable_exploration: true,

            embed_cache_capacity: 50_000,
            content_cache_capacity: 2_000,
        }
    }
}

impl Settings {
    /// Loads `.env` (if present) and applies environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            chat_model: env_or("CHAT_MODEL", defaults.chat_model),
            agent_summary_model: env_or("AGENT_SUMMARY_MODEL", defaults.agent_summary_model),
            embedding_model: env_or("EMBEDDING_MODEL", defaults.embedding_model),
            embedding_batch_size: env_parse("EMBEDDING_BATCH_SIZE", defaults.embedding_batch_size),
            max_embed_chars: env_parse("MAX_EMBED_CHARS", defaults.max_embed_chars),
            search_results: env_parse("SEARCH_RESULTS", defaults.search_results),
            reflexion_search_results: env_parse(
                "REFLEXION_SEARCH_RESULTS",
                defaults.reflexion_search_results,
            ),
            top_k_results_per_section: env_parse(
                "TOP_K_RESULTS_PER_SECTION",
                defaults.top_k_results_per_section,
            ),
            max_cycles: env_parse("MAX_CYCLES", defaults.max_cycles),
            boot_queries: env_parse("BOOT_QUERIES", defaults.boot_queries),
            chunk_sentences: env_parse("CHUNK_SENTENCES", defaults.chunk_sentences),
            min_page_chars: env_parse("MIN_PAGE_CHARS", defaults.min_page_chars),
            max_page_chars: env_parse("MAX_PAGE_CHARS", defaults.max_page_chars),
            max_abstract_context_chars: env_parse(
                "MAX_ABSTRACT_CONTEXT_CHARS",
                defaults.max_abstract_context_chars,
            ),
            outline_context_chunks: env_parse(
                "OUTLINE_CONTEXT_CHUNKS",
                defaults.outline_context_chunks,
            ),
            pca_components: env_parse("PCA_COMPONENTS", defaults.pca_components),
            n_clusters: env_parse("N_CLUSTERS", defaults.n_clusters),
            kmeans_seed: env_parse("KMEANS_SEED", defaults.kmeans_seed),
            latent_novelty_threshold: env_parse(
                "LATENT_NOVELTY_THRESHOLD",
                defaults.latent_novelty_threshold,
            ),
            novelty_alpha: env_parse("NOVELTY_ALPHA", defaults.novelty_alpha),
            novelty_top_k: env_parse("NOVELTY_TOP_K", defaults.novelty_top_k),
            diminishing_returns_threshold: env_parse(
                "DIMINISHING_RETURNS_THRESHOLD",
                defaults.diminishing_returns_threshold,
            ),
            diminishing_returns_window: env_parse(
                "DIMINISHING_RETURNS_WINDOW",
                defaults.diminishing_returns_window,
            ),
            max_reflexion_loops: env_parse("MAX_REFLEXION_LOOPS", defaults.max_reflexion_loops),
            enable_exploration: env::var("ENABLE_EXPLORATION")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enable_exploration),
            embed_cache_capacity: env_parse("EMBED_CACHE_CAPACITY", defaults.embed_cache_capacity),
            content_cache_capacity: env_parse(
                "CONTENT_CACHE_CAPACITY",
                defaults.content_cache_capacity,
            ),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
