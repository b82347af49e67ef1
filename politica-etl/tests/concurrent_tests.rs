//! Concurrent writer tests
//!
//! Several loads racing on one store must still produce exactly one row per
//! natural key.

mod helpers;

use helpers::*;
use politica_etl::models::{CandidacyRow, PartyRow};
use politica_etl::Loader;
use tokio::task::JoinSet;

fn overlapping_rows(offset: i64) -> Vec<CandidacyRow> {
    // Five politicians shared by every load, each row its own candidacy
    (0..20)
        .map(|i| {
            let n = (i + offset) % 20;
            let name = format!("CANDIDATO {}", n % 5);
            candidacy(&name, 13, 1300 + n, &format!("{:04}", n))
        })
        .collect()
}

#[tokio::test]
async fn test_parallel_loads_create_each_entity_once() {
    let (_dir, pool) = create_test_db(10).await.unwrap();
    Loader::new(pool.clone(), options(10, 1))
        .load_parties(vec![PartyRow::new(13, "PT", "PARTIDO DOS TRABALHADORES")])
        .await
        .unwrap();

    let mut loads = JoinSet::new();
    for offset in [0, 7, 13] {
        let loader = Loader::new(pool.clone(), options(2, 3));
        loads.spawn(async move { loader.load_candidacies(overlapping_rows(offset), 2022).await });
    }

    let mut inserted = 0;
    while let Some(result) = loads.join_next().await {
        let summary = result.unwrap().unwrap();
        assert!(summary.is_clean(), "chunk errors: {:?}", summary.chunk_errors);
        inserted += summary.inserted;
    }

    assert_eq!(inserted, 20);
    assert_eq!(count_rows(&pool, "politicians").await, 5);
    assert_eq!(count_rows(&pool, "elections").await, 1);
    assert_eq!(count_rows(&pool, "candidacies").await, 20);
}

#[tokio::test]
async fn test_parallel_merges_set_same_totals() {
    let (_dir, pool) = create_test_db(6).await.unwrap();
    let loader = Loader::new(pool.clone(), options(5, 2));
    loader
        .load_parties(vec![PartyRow::new(13, "PT", "PARTIDO DOS TRABALHADORES")])
        .await
        .unwrap();
    loader.load_candidacies(overlapping_rows(0), 2022).await.unwrap();

    let partitions = || {
        vec![
            politica_etl::models::TallyPartition::new("AC", vec![tally("0001", 4, "ELEITO")]),
            politica_etl::models::TallyPartition::new("AM", vec![tally("0001", 6, "ELEITO")]),
        ]
    };

    let (a, b) = tokio::join!(
        loader.merge_vote_results(partitions()),
        loader.merge_vote_results(partitions())
    );
    assert_eq!(a.unwrap().updated, 1);
    assert_eq!(b.unwrap().updated, 1);

    let total: i64 =
        sqlx::query_scalar("SELECT total_votes FROM candidacies WHERE external_sequence_id = '0001'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total, 10);
}
