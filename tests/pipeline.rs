mod common;

use common::*;
use deep_research::{prompts, ResearchPipeline, Settings};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn produces_cited_report_for_query() {
    let harness = Harness::new(StubReasoner::default());
    let pipeline = ResearchPipeline::new(harness.services.clone(), test_settings());

    let outcome = pipeline
        .run_with_timings("history of the telegraph")
        .await
        .unwrap();
    let report = outcome.report;

    assert!(report.starts_with("# The Electric Telegraph\n\n## Abstract\n\n"));
    assert!(report.contains("## Early Experiments\n\n"));
    assert!(report.contains("## Morse Code\n\n"));
    assert!(!report.contains("[Source"));
    assert!(!report.contains("Made up book"));

    let (body, bibliography) = report.split_once("## Bibliography\n\n").unwrap();
    let cited = citations(body);
    assert!(!cited.is_empty());
    for n in cited {
        assert!(
            bibliography.contains(&format!("[{}] ", n)),
            "citation [{}] missing from bibliography",
            n
        );
    }
    assert!(bibliography.contains("<https://example.com/"));

    for section in body.split("\n## ").skip(1) {
        let (heading, text) = section.split_once("\n\n").unwrap();
        if heading == "Abstract" {
            continue;
        }
        assert!(!citations(text).is_empty(), "section '{}' has no citation", heading);
    }
    assert!(!bibliography.contains("Reference information not available"));

    for task in ["initial_setup", "planning", "synthesis"] {
        assert!(outcome.task_times.contains_key(task), "no timing for {}", task);
    }
    // Planner declared the research complete on the first cycle.
    assert!(!outcome.task_times.contains_key("acting"));
}

#[tokio::test]
async fn follows_plan_through_a_full_cycle() {
    let plan = r#"{"critique": "Nothing on cables yet.", "thought": "Search cables and track legacy.",
        "plan": [
          {"action": "SEARCH", "query": "transatlantic cable 1866", "target_outline_topic": "Morse Code"},
          {"action": "ADD_TO_OUTLINE", "topic": "Legacy", "subtopics": ["Telephone", "Internet"]},
          {"action": "ADD_TO_OUTLINE", "topic": "Morse Code", "subtopics": []}
        ]}"#;
    let harness = Harness::new(StubReasoner::with_plans(&[plan]));
    let pipeline = ResearchPipeline::new(harness.services.clone(), test_settings());

    let outcome = pipeline
        .run_with_timings("history of the telegraph")
        .await
        .unwrap();

    assert!(outcome.report.contains("## Legacy\n\n"));
    assert_eq!(outcome.report.matches("## Morse Code").count(), 1);
    // Three boot queries plus the planned search.
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 4);
    assert_eq!(harness.reasoner.calls_with_system(prompts::PLANNER_CRITIC), 2);
    assert!(outcome.task_times.contains_key("acting"));
    assert!(outcome.task_times.contains_key("analyzing"));
}

#[tokio::test]
async fn stops_at_cycle_budget() {
    let search = r#"{"critique": "More.", "thought": "More.",
        "plan": [{"action": "SEARCH", "query": "telegraph companies", "target_outline_topic": "Morse Code"}]}"#;
    let harness = Harness::new(StubReasoner::with_plans(&[search, search, search, search, search]));
    let settings = Settings {
        max_cycles: 3,
        ..test_settings()
    };
    let pipeline = ResearchPipeline::new(harness.services.clone(), settings);

    let report = pipeline.run("history of the telegraph").await;

    assert!(report.contains("## Bibliography"));
    // Setup counts as cycle one, so cycles two and three plan.
    assert_eq!(harness.reasoner.calls_with_system(prompts::PLANNER_CRITIC), 2);
}

#[tokio::test]
async fn single_cycle_budget_goes_straight_to_synthesis() {
    let harness = Harness::new(StubReasoner::default());
    let settings = Settings {
        max_cycles: 1,
        ..test_settings()
    };
    let pipeline = ResearchPipeline::new(harness.services.clone(), settings);

    let report = pipeline.run("history of the telegraph").await;

    assert!(report.starts_with("# The Electric Telegraph"));
    assert_eq!(harness.reasoner.calls_with_system(prompts::PLANNER_CRITIC), 0);
}

#[tokio::test]
async fn query_embedding_failure_is_reported() {
    let harness = Harness::with_embedder(StubReasoner::default(), StubEmbedder::failing());
    let pipeline = ResearchPipeline::new(harness.services.clone(), test_settings());

    let report = pipeline.run("history of the telegraph").await;

    assert_eq!(
        report,
        "Error: Could not process the initial query due to an embedding failure."
    );
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparsable_plan_ends_research() {
    let harness = Harness::new(StubReasoner::with_plans(&["I am not sure what to do next."]));
    let pipeline = ResearchPipeline::new(harness.services.clone(), test_settings());

    let outcome = pipeline
        .run_with_timings("history of the telegraph")
        .await
        .unwrap();

    assert!(outcome.report.contains("## Bibliography"));
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 3);
    assert!(!outcome.task_times.contains_key("acting"));
}

#[tokio::test]
async fn stalled_information_gain_ends_research_early() {
    let repeat = r#"{"critique": "Still thin.", "thought": "Try again.",
        "plan": [{"action": "SEARCH", "query": "telegraph companies", "target_outline_topic": "Morse Code"}]}"#;
    let harness = Harness::new(StubReasoner::with_plans(&[repeat; 10]));
    let settings = Settings {
        max_cycles: 10,
        ..test_settings()
    };
    let pipeline = ResearchPipeline::new(harness.services.clone(), settings);

    let outcome = pipeline
        .run_with_timings("history of the telegraph")
        .await
        .unwrap();

    // The first planned search finds new pages; the repeats find nothing, so
    // coverage stops moving and two zero-gain cycles end the loop.
    assert_eq!(harness.reasoner.calls_with_system(prompts::PLANNER_CRITIC), 3);
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 3 + 3);
    assert!(outcome.report.contains("## Bibliography"));
    assert!(outcome.task_times.contains_key("analyzing"));
}

#[tokio::test]
async fn plan_with_only_malformed_actions_keeps_researching() {
    let malformed = r#"{"critique": "Need more.", "thought": "Search.",
        "plan": [{"action": "SEARCH", "query": ""}]}"#;
    let harness = Harness::new(StubReasoner::with_plans(&[malformed]));
    let pipeline = ResearchPipeline::new(harness.services.clone(), test_settings());

    let outcome = pipeline
        .run_with_timings("history of the telegraph")
        .await
        .unwrap();

    assert!(outcome.task_times.contains_key("acting"));
    assert_eq!(harness.reasoner.calls_with_system(prompts::PLANNER_CRITIC), 2);
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 3);
    assert!(outcome.report.contains("## Bibliography"));
}
