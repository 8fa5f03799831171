/// End-to-end search, ranking and merge scenarios
/// Runs the engine and the service against small in-memory corpora
use rust_profile_match::config::Config;
use rust_profile_match::corpus::{Corpus, InMemoryCorpus};
use rust_profile_match::models::{Query, Record, SearchStatus, SourceMapping, UnifiedField};
use rust_profile_match::profile_store::ProfileStore;
use rust_profile_match::search::SearchEngine;
use rust_profile_match::service::ProfileService;
use serde_json::json;
use std::sync::Arc;

fn rows(values: Vec<serde_json::Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn celebrity_corpus() -> Corpus {
    Corpus::new()
        .with_source(
            "bank",
            rows(vec![
                json!({"full_name": "Leo DiCaprio", "dob": "1974-11-11", "customer_id": "BANK001"}),
                json!({"full_name": "Brad Pitt", "dob": "1963-12-18", "customer_id": "BANK002"}),
            ]),
            None,
        )
        .with_source(
            "crm",
            rows(vec![
                json!({"client_name": "Leonardo Di Caprio", "birth_date": "11/12/1974", "email_addr": "leo@example.com"}),
                json!({"client_name": "Kate Winslet", "birth_date": "10/05/1975", "email_addr": "kate@example.com"}),
            ]),
            None,
        )
        .with_source(
            "shop",
            rows(vec![
                json!({"name": "Maria Garcia", "email": "maria@example.com"}),
                json!({"name": "Chen Wei", "email": "chen@example.com"}),
            ]),
            None,
        )
}

fn leonardo_query() -> Query {
    Query::new()
        .with(UnifiedField::FullName, "Leonardo DiCaprio")
        .with(UnifiedField::Dob, "1974-11-11")
        .with(UnifiedField::NationalId, "BANK001")
}

/// Ten candidates sharing the queried name; only `strong_at` carries the exact ID.
fn ten_candidates(strong_at: Option<usize>) -> Corpus {
    let records = (0..10)
        .map(|i| {
            let id = if Some(i) == strong_at { "AB123456" } else { "AB12345X" };
            json!({"full_name": "Jane Roe", "national_id": id, "row": i})
        })
        .collect();
    Corpus::new().with_source("registry", rows(records), None)
}

fn jane_query() -> Query {
    Query::new()
        .with(UnifiedField::FullName, "Jane Roe")
        .with(UnifiedField::NationalId, "AB123456")
}

#[cfg(test)]
mod ranking_tests {
    use super::*;

    #[test]
    fn test_exact_id_record_becomes_merged_base() {
        let engine = SearchEngine::default();

        let outcome = engine.search(&leonardo_query(), &celebrity_corpus());

        assert_eq!(outcome.status, SearchStatus::Matched);
        let top = &outcome.individual_matches[0];
        assert_eq!(top.source, "bank");
        assert_eq!(top.result.field_scores.get(&UnifiedField::NationalId), 100.0);
        assert!(top.result.is_strong_match);

        let profile = outcome.merged_profile.as_ref().unwrap();
        assert_eq!(profile.body["customer_id"], json!("BANK001"));
        assert!(profile.match_quality.is_strong_match);
        assert_eq!(profile.match_count, outcome.individual_matches.len());
        assert!(profile.sources.contains(&"bank".to_string()));
        assert!(!profile.sources.contains(&"shop".to_string()));
    }

    #[test]
    fn test_name_and_dob_match_across_renamed_columns() {
        let engine = SearchEngine::default();

        let outcome = engine.search(&leonardo_query(), &celebrity_corpus());

        let crm = &outcome.matches_by_source["crm"];
        assert_eq!(crm.len(), 1);
        assert_eq!(crm[0].record["client_name"], json!("Leonardo Di Caprio"));
        // one day off
        assert_eq!(crm[0].field_scores.get(&UnifiedField::Dob), 90.0);
        assert!(crm[0].is_strong_match);
        assert_eq!(outcome.summary.sources_matched, 2);
        assert_eq!(outcome.summary.source_breakdown["bank"], 1);
        assert!(outcome.summary.has_strong_matches);
    }

    #[test]
    fn test_name_only_query_without_close_names() {
        let engine = SearchEngine::default();
        let query = Query::new().with(UnifiedField::FullName, "John Doe");

        let outcome = engine.search(&query, &celebrity_corpus());

        assert_eq!(outcome.status, SearchStatus::NoMatch);
        assert!(outcome.merged_profile.is_none());
        assert_eq!(outcome.match_count(), 0);
        assert_eq!(outcome.summary.highest_score, 0.0);
        assert_eq!(outcome.report.records_scored, 6);
    }

    #[test]
    fn test_cap_keeps_strong_plus_two() {
        let engine = SearchEngine::default();

        let outcome = engine.search(&jane_query(), &ten_candidates(Some(6)));

        let kept = &outcome.matches_by_source["registry"];
        assert_eq!(outcome.report.records_accepted, 10);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].is_strong_match);
        assert_eq!(kept[0].record["row"], json!(6));
        assert!(!kept[1].is_strong_match && !kept[2].is_strong_match);
        assert_eq!(kept[1].record["row"], json!(0));
        assert_eq!(kept[2].record["row"], json!(1));
    }

    #[test]
    fn test_cap_without_strong_matches() {
        let engine = SearchEngine::default();

        let outcome = engine.search(&jane_query(), &ten_candidates(None));

        let kept = &outcome.matches_by_source["registry"];
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|m| !m.is_strong_match));
        // equal scores keep record order
        let rows: Vec<_> = kept.iter().map(|m| m.record["row"].clone()).collect();
        assert_eq!(rows, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_repeated_search_is_identical() {
        let engine = SearchEngine::default();
        let corpus = celebrity_corpus();

        let first = engine.search(&leonardo_query(), &corpus);
        let second = engine.search(&leonardo_query(), &corpus);

        assert_eq!(first.individual_matches, second.individual_matches);
        assert_eq!(first.matches_by_source, second.matches_by_source);
        assert_eq!(first.summary, second.summary);
        let base = |o: &rust_profile_match::SearchOutcome| {
            o.merged_profile
                .as_ref()
                .map(|p| (p.body.clone(), p.sources.clone(), p.match_count))
        };
        assert_eq!(base(&first), base(&second));
    }

    #[test]
    fn test_single_match_round_trip() {
        let engine = SearchEngine::default();
        let original = json!({
            "full_name": "Jane Roe",
            "national_id": "AB123456",
            "city": "Porto",
            "loyalty_points": 120
        });
        let corpus = Corpus::new().with_source("crm", rows(vec![original.clone()]), None);

        let outcome = engine.search(&jane_query(), &corpus);

        let profile = outcome.merged_profile.unwrap();
        assert_eq!(serde_json::Value::Object(profile.body), original);
        assert_eq!(profile.sources, vec!["crm"]);
        assert_eq!(profile.match_count, 1);
    }

    #[test]
    fn test_supplied_mapping_is_used() {
        let engine = SearchEngine::default();
        let mapping = SourceMapping::new("ledger")
            .with("holder", UnifiedField::FullName, 0.9)
            .with("doc", UnifiedField::NationalId, 0.9);
        let corpus = Corpus::new().with_source(
            "ledger",
            rows(vec![json!({"holder": "Jane Roe", "doc": "AB-123-456"})]),
            Some(mapping),
        );

        let outcome = engine.search(&jane_query(), &corpus);

        let top = &outcome.individual_matches[0];
        assert_eq!(top.result.field_scores.get(&UnifiedField::NationalId), 100.0);
        assert_eq!(top.result.field_scores.get(&UnifiedField::FullName), 100.0);
    }

    #[test]
    fn test_empty_sources_report_no_data() {
        let engine = SearchEngine::default();
        let corpus = Corpus::new().with_source("crm", Vec::new(), None);

        let outcome = engine.search(&jane_query(), &corpus);

        assert_eq!(outcome.status, SearchStatus::NoData);
        assert_eq!(outcome.status.message(), "No data available");
    }
}

#[cfg(test)]
mod async_tests {
    use super::*;

    #[tokio::test]
    async fn test_parallel_search_matches_sequential() {
        let engine = Arc::new(SearchEngine::default());
        let corpus = Arc::new(celebrity_corpus().with_source(
            "registry",
            ten_candidates(Some(3)).get("registry").unwrap().records.clone(),
            None,
        ));
        let query = leonardo_query().with(UnifiedField::NationalId, "AB123456");

        let sequential = engine.search(&query, &corpus);
        let parallel = Arc::clone(&engine)
            .search_parallel(query.clone(), Arc::clone(&corpus))
            .await
            .unwrap();

        assert_eq!(parallel.status, sequential.status);
        assert_eq!(parallel.matches_by_source, sequential.matches_by_source);
        assert_eq!(parallel.individual_matches, sequential.individual_matches);
        assert_eq!(parallel.summary, sequential.summary);
        assert_eq!(parallel.report, sequential.report);
    }

    #[tokio::test]
    async fn test_service_persists_merged_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            profiles_dir: dir.path().join("profiles"),
            ..Config::default()
        };
        let service = ProfileService::new(config, InMemoryCorpus::new(celebrity_corpus()));

        let lookup = service.find_profile(leonardo_query()).await.unwrap();

        let path = lookup.saved_to.clone().unwrap();
        assert_eq!(path.file_name().unwrap(), "profile_BANK001.json");
        let stored = service.store().load(&leonardo_query()).await.unwrap().unwrap();
        assert_eq!(stored["customer_id"], json!("BANK001"));
        assert_eq!(stored["match_quality"]["is_strong_match"], json!(true));
        assert!(stored["sources"].as_array().unwrap().contains(&json!("bank")));
        // three distinct column sets
        assert_eq!(service.mapper().cache().hits(), 0);
    }

    #[tokio::test]
    async fn test_service_without_match_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            profiles_dir: dir.path().to_path_buf(),
            parallel_search: false,
            ..Config::default()
        };
        let service = ProfileService::new(config, InMemoryCorpus::new(celebrity_corpus()));
        let query = Query::new().with(UnifiedField::FullName, "John Doe");

        let lookup = service.find_profile(query.clone()).await.unwrap();

        assert_eq!(lookup.outcome.status, SearchStatus::NoMatch);
        assert!(lookup.saved_to.is_none());
        let store = ProfileStore::new(dir.path());
        assert!(store.load(&query).await.unwrap().is_none());
    }
}
