mod common;

use trip_lease::engine::negotiation::MatchResponse;
use trip_lease::models::match_record::{Initiator, MatchStatus};
use trip_lease::models::tla::{SignatureRole, TlaStatus};
use trip_lease::store::LeaseStore;

use common::Fixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_responses_resolve_to_exactly_one_outcome() {
    let fx = Fixture::new();
    let created = fx
        .state
        .negotiation
        .create(fx.new_match(Initiator::LoadOwner, 2500.0))
        .await
        .unwrap();

    let match_id = created.id;
    fx.gated.gate("get_match", 8);

    let mut handles = Vec::new();
    for i in 0..8 {
        let state = fx.state.clone();
        let actor = fx.fleet_a.id;
        handles.push(tokio::spawn(async move {
            let response = if i % 2 == 0 {
                MatchResponse::Accept
            } else {
                MatchResponse::Decline {
                    reason: Some("Driver booked".to_string()),
                }
            };
            state.negotiation.respond(match_id, actor, response).await
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => winners.push(record.status),
            Err(err) => {
                assert_eq!(err.code(), "conflict", "unexpected error {err}");
                conflicts += 1;
            }
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 7);
    let stored = fx.state.negotiation.get(match_id).await.unwrap();
    assert_eq!(stored.status, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_proposals_for_one_pair_open_a_single_match() {
    let fx = Fixture::new();
    fx.gated.gate("find_open_match", 2);

    let from_load_owner = {
        let state = fx.state.clone();
        let request = fx.new_match(Initiator::LoadOwner, 2500.0);
        tokio::spawn(async move { state.negotiation.create(request).await })
    };
    let from_driver_owner = {
        let state = fx.state.clone();
        let request = fx.new_match(Initiator::DriverOwner, 2700.0);
        tokio::spawn(async move { state.negotiation.create(request).await })
    };

    let results = [
        from_load_owner.await.unwrap(),
        from_driver_owner.await.unwrap(),
    ];
    let opened = results.iter().filter(|result| result.is_ok()).count();
    let rejected: Vec<_> = results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .map(|err| err.code())
        .collect();

    assert_eq!(opened, 1);
    assert_eq!(rejected, vec!["conflict"]);
    assert_eq!(fx.store.match_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_generation_keeps_one_agreement() {
    let fx = Fixture::new();
    let accepted = fx.accepted_match_for(fx.load.id).await;
    fx.gated.gate("get_match", 2);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let state = fx.state.clone();
        let match_id = accepted.id;
        handles.push(tokio::spawn(async move {
            state.signing.create_from_match(match_id).await
        }));
    }

    let mut generated = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(tla) => generated.push(tla.id),
            Err(err) => assert_eq!(err.code(), "conflict", "unexpected error {err}"),
        }
    }

    assert_eq!(generated.len(), 1);
    assert_eq!(fx.store.tla_count(), 1);
    let linked = fx.store.get_match(accepted.id).await.unwrap().record;
    assert_eq!(linked.tla_id, Some(generated[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_signatures_for_the_same_role_record_one() {
    let fx = Fixture::new();
    let tla = fx.pending_tla_for(fx.load.id).await;

    let tla_id = tla.id;
    fx.gated.gate("get_tla", 6);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let state = fx.state.clone();
        let request = fx.sign_request(SignatureRole::Lessor);
        handles.push(tokio::spawn(async move {
            state.signing.sign(tla_id, request).await
        }));
    }

    let mut successes = 0;
    let mut already_signed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.code(), "already_signed", "unexpected error {err}");
                already_signed += 1;
            }
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_signed, 5);
    let stored = fx.state.signing.get(tla_id).await.unwrap();
    assert_eq!(stored.status, TlaStatus::PendingLessee);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn both_roles_signing_at_once_reach_signed() {
    let fx = Fixture::new();
    let tla = fx.pending_tla_for(fx.load.id).await;

    let tla_id = tla.id;
    fx.gated.gate("get_tla", 2);

    let mut handles = Vec::new();
    for role in [SignatureRole::Lessor, SignatureRole::Lessee] {
        let state = fx.state.clone();
        let request = fx.sign_request(role);
        handles.push(tokio::spawn(async move {
            state.signing.sign(tla_id, request).await
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().unwrap().status);
    }

    assert_eq!(
        statuses.iter().filter(|status| **status == TlaStatus::Signed).count(),
        1
    );
    let stored = fx.state.signing.get(tla_id).await.unwrap();
    assert_eq!(stored.status, TlaStatus::Signed);
    assert!(stored.fully_signed());
    assert_eq!(
        fx.store.get_match(tla.match_id).await.unwrap().record.status,
        MatchStatus::TlaSigned
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_ratings_on_one_agreement_count_once() {
    let fx = Fixture::new();
    let completed = fx.completed_tla_for(fx.load.id).await;

    let tla_id = completed.id;
    fx.gated.gate("rating_transaction", 2);

    let mut handles = Vec::new();
    for score in [5, 1] {
        let state = fx.state.clone();
        let rater = fx.fleet_b.id;
        handles.push(tokio::spawn(async move {
            state.ratings.rate_driver(tla_id, rater, score, None).await
        }));
    }

    let mut applied = Vec::new();
    let mut already_rated = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => applied.push(outcome.rating_count),
            Err(err) => {
                assert_eq!(err.code(), "already_rated", "unexpected error {err}");
                already_rated += 1;
            }
        }
    }

    assert_eq!(applied, vec![3]);
    assert_eq!(already_rated, 1);

    let driver = fx.driver_record().await;
    assert_eq!(driver.rating_count, 3);
    assert!(driver.rating == 4.3 || driver.rating == 3.0);
    assert_eq!(fx.store.list_ratings(fx.driver.key()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ratings_on_distinct_agreements_lose_no_updates() {
    let fx = Fixture::new();
    let mut unrated = fx.driver.clone();
    unrated.rating = 0.0;
    unrated.rating_count = 0;
    fx.store.put_driver(unrated);

    let mut agreements = Vec::new();
    for _ in 0..10 {
        let load = fx.add_load();
        agreements.push(fx.completed_tla_for(load.id).await);
    }

    fx.gated.gate("rating_transaction", 10);

    let mut handles = Vec::new();
    for tla in agreements {
        let state = fx.state.clone();
        let rater = fx.fleet_b.id;
        handles.push(tokio::spawn(async move {
            state.ratings.rate_driver(tla.id, rater, 5, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let driver = fx.driver_record().await;
    assert_eq!(driver.rating, 5.0);
    assert_eq!(driver.rating_count, 10);
    assert_eq!(fx.store.list_ratings(fx.driver.key()).await.unwrap().len(), 10);
}
