mod support;

use std::{collections::HashSet, time::Duration};

use conversation::{AddType, EntriesUpdate, EntryKey, HistoryError};
use executors_protocol::{
    ActionType, CommandExitStatus, ExecutionProcessStatus, NormalizedEntryType, ScriptContext,
    ToolStatus,
};
use logs_protocol::ConversationPatch;
use support::{
    Harness, agent, agent_store, assistant, follow_up, keys, script, script_store, setup_required,
};
use uuid::Uuid;

fn next_action(update: &EntriesUpdate) -> (bool, usize, bool, Option<String>) {
    let last = update.entries.last().expect("entries");
    assert_eq!(last.key, EntryKey::NextAction);
    match &last.entry.as_normalized().expect("normalized").entry_type {
        NormalizedEntryType::NextAction {
            failed,
            execution_processes,
            needs_setup,
            setup_help_text,
        } => (
            *failed,
            *execution_processes,
            *needs_setup,
            setup_help_text.clone(),
        ),
        other => panic!("expected next_action, got {other:?}"),
    }
}

fn has_unique_keys(update: &EntriesUpdate) -> bool {
    let keys: HashSet<EntryKey> = update.entries.iter().map(|e| e.key).collect();
    keys.len() == update.entries.len()
}

#[tokio::test]
async fn timeline_follows_creation_order_across_sources() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);
    let p2 = script(attempt, 1, ExecutionProcessStatus::Completed, ScriptContext::SetupScript);
    let p3 = agent(attempt, 2, ExecutionProcessStatus::Running);
    h.client.register(
        p1.id,
        agent_store(vec![assistant("reading files"), assistant("done")], true),
    );
    h.client
        .register(p2.id, script_store(&["added 12 packages"], true));
    h.client
        .register(p3.id, agent_store(vec![assistant("on it")], false));

    h.history.set_attempt(attempt);
    h.history
        .sync_processes(&[p3.clone(), p1.clone(), p2.clone()])
        .unwrap();

    let expected = vec![
        format!("{}:user", p1.id),
        format!("{}:0", p1.id),
        format!("{}:1", p1.id),
        format!("{}:0", p2.id),
        format!("{}:user", p3.id),
        format!("{}:0", p3.id),
        format!("{}:loading", p3.id),
    ];
    let seen = h.wait_for_keys(&expected).await;

    assert_eq!(
        seen.iter()
            .filter(|u| u.add_type == AddType::Initial)
            .count(),
        1
    );
    assert!(seen.iter().all(|u| u.add_type != AddType::Historic));
    assert!(seen.iter().all(has_unique_keys));
    assert!(
        seen.iter()
            .all(|u| u.entries.iter().all(|e| e.key != EntryKey::NextAction))
    );

    let last = seen.last().unwrap();
    assert!(!last.loading);
    match &last.entries[3].entry.as_normalized().unwrap().entry_type {
        NormalizedEntryType::ToolUse {
            action_type: ActionType::CommandRun { result, .. },
            status,
            ..
        } => {
            assert_eq!(status, &ToolStatus::Success);
            let result = result.as_ref().unwrap();
            assert_eq!(result.output.as_deref(), Some("added 12 packages"));
            assert_eq!(
                result.exit_status,
                Some(CommandExitStatus::ExitCode { code: 0 })
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn failed_last_process_offers_next_action() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);
    let p2 = script(attempt, 1, ExecutionProcessStatus::Completed, ScriptContext::SetupScript);
    let p3 = follow_up(attempt, 2, ExecutionProcessStatus::Failed);
    h.client
        .register(p1.id, agent_store(vec![assistant("a"), assistant("b")], true));
    h.client.register(p2.id, script_store(&["ok"], true));
    h.client.register(
        p3.id,
        agent_store(
            vec![
                assistant("trying"),
                setup_required("Run `gh auth login` first"),
            ],
            true,
        ),
    );

    h.history.set_attempt(attempt);
    h.history
        .sync_processes(&[p1.clone(), p2.clone(), p3.clone()])
        .unwrap();

    let initial = h.wait_for_initial().await;
    assert!(!initial.loading);
    assert_eq!(
        next_action(&initial),
        (
            true,
            3,
            true,
            Some("Run `gh auth login` first".to_string())
        )
    );
    let keys = keys(&initial);
    assert_eq!(keys[4], format!("{}:user", p3.id));
    assert!(!keys.contains(&format!("{}:loading", p3.id)));
}

#[tokio::test(start_paused = true)]
async fn live_stream_attaches_on_the_last_retry() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    let store = agent_store(vec![assistant("first")], false);
    h.client.register(p1.id, store.clone());
    h.client.fail_next(p1.id, 19);

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    let mut seen = h
        .wait_for_keys(&[
            format!("{}:user", p1.id),
            format!("{}:0", p1.id),
            format!("{}:loading", p1.id),
        ])
        .await;

    store.push_patch(ConversationPatch::add_normalized_entry(
        1,
        assistant("second"),
    ));
    seen.extend(
        h.wait_for_keys(&[
            format!("{}:user", p1.id),
            format!("{}:0", p1.id),
            format!("{}:1", p1.id),
            format!("{}:loading", p1.id),
        ])
        .await,
    );

    assert_eq!(h.client.opens(p1.id), 20);
    assert_eq!(h.client.successful_opens(p1.id), 1);
    assert!(seen.iter().all(has_unique_keys));
}

#[tokio::test(start_paused = true)]
async fn exhausted_live_stream_stays_silent_until_the_process_ends() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let mut p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    let store = agent_store(vec![assistant("hidden")], false);
    h.client.register(p1.id, store.clone());
    h.client.fail_next(p1.id, 20);

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(
        keys(&initial),
        vec![format!("{}:user", p1.id), format!("{}:loading", p1.id)]
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.drain().is_empty());
    assert_eq!(h.client.opens(p1.id), 20);
    assert_eq!(h.client.successful_opens(p1.id), 0);

    // Once the directory reports the process finished, its entries are read
    // as history instead.
    store.push_finished();
    p1.status = ExecutionProcessStatus::Completed;
    p1.exit_code = Some(0);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    h.wait_for_keys(&[
        format!("{}:user", p1.id),
        format!("{}:0", p1.id),
        "next_action".to_string(),
    ])
    .await;
    assert_eq!(h.client.successful_opens(p1.id), 1);
}

#[tokio::test]
async fn returning_to_an_attempt_replays_cached_history() {
    let mut h = Harness::new();
    let attempt_a = Uuid::new_v4();
    let attempt_b = Uuid::new_v4();
    let p1 = agent(attempt_a, 0, ExecutionProcessStatus::Completed);
    let p2 = script(attempt_a, 1, ExecutionProcessStatus::Failed, ScriptContext::CleanupScript);
    let q1 = agent(attempt_b, 0, ExecutionProcessStatus::Completed);
    h.client.register(p1.id, agent_store(vec![assistant("a")], true));
    h.client.register(p2.id, script_store(&["boom"], true));
    h.client.register(q1.id, agent_store(vec![assistant("b")], true));

    h.history.set_attempt(attempt_a);
    h.history
        .sync_processes(&[p1.clone(), p2.clone()])
        .unwrap();
    let first = h.wait_for_initial().await;

    h.history.set_attempt(attempt_b);
    h.history.sync_processes(&[q1.clone()]).unwrap();
    let other = h.wait_for_initial().await;
    assert!(keys(&other).contains(&format!("{}:0", q1.id)));

    h.history.set_attempt(attempt_a);
    h.history
        .sync_processes(&[p1.clone(), p2.clone()])
        .unwrap();
    let again = h.wait_for_initial().await;

    assert_eq!(first.entries, again.entries);
    assert_eq!(h.client.opens(p1.id), 1);
    assert_eq!(h.client.opens(p2.id), 1);
    assert_eq!(h.cache.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn late_history_of_a_previous_attempt_is_discarded() {
    let mut h = Harness::new();
    let attempt_a = Uuid::new_v4();
    let attempt_b = Uuid::new_v4();
    let p1 = agent(attempt_a, 0, ExecutionProcessStatus::Completed);
    let q1 = agent(attempt_b, 0, ExecutionProcessStatus::Completed);
    h.client.register(p1.id, agent_store(vec![assistant("slow")], true));
    h.client.delay_opens(p1.id, Duration::from_secs(5));
    h.client.register(q1.id, agent_store(vec![assistant("fast")], true));

    h.history.set_attempt(attempt_a);
    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.history.set_attempt(attempt_b);
    h.history.sync_processes(&[q1.clone()]).unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(
        keys(&initial),
        vec![
            format!("{}:user", q1.id),
            format!("{}:0", q1.id),
            "next_action".to_string(),
        ]
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.drain().is_empty());
    assert!(
        h.history
            .entries()
            .iter()
            .all(|entry| entry.process_id != Some(p1.id))
    );
    // The fetch itself was allowed to finish.
    assert!(h.cache.contains(attempt_a, p1.id));
}

#[tokio::test]
async fn finished_live_stream_needs_no_history_fetch() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let mut p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    let store = agent_store(vec![assistant("working")], false);
    h.client.register(p1.id, store.clone());

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.wait_for_keys(&[
        format!("{}:user", p1.id),
        format!("{}:0", p1.id),
        format!("{}:loading", p1.id),
    ])
    .await;

    store.push_patch(ConversationPatch::add_normalized_entry(1, assistant("done")));
    store.push_finished();
    h.wait_for(|update| keys(update).contains(&format!("{}:1", p1.id)))
        .await;

    p1.status = ExecutionProcessStatus::Completed;
    p1.exit_code = Some(0);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    let update = h
        .wait_for(|update| {
            update
                .entries
                .last()
                .is_some_and(|e| e.key == EntryKey::NextAction)
        })
        .await
        .pop()
        .unwrap();
    assert_eq!(update.add_type, AddType::Running);
    assert_eq!(update.entries.len(), 4);
    assert_eq!(next_action(&update), (false, 1, false, None));
    tokio::task::yield_now().await;
    assert_eq!(h.client.opens(p1.id), 1);
}

#[tokio::test]
async fn live_stream_moves_to_the_next_running_process() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let mut p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    let p2 = follow_up(attempt, 5, ExecutionProcessStatus::Running);
    let first = agent_store(vec![assistant("one")], false);
    h.client.register(p1.id, first.clone());
    h.client
        .register(p2.id, agent_store(vec![assistant("two")], false));

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.wait_for_keys(&[
        format!("{}:user", p1.id),
        format!("{}:0", p1.id),
        format!("{}:loading", p1.id),
    ])
    .await;

    first.push_finished();
    p1.status = ExecutionProcessStatus::Completed;
    p1.exit_code = Some(0);
    h.history
        .sync_processes(&[p1.clone(), p2.clone()])
        .unwrap();

    let seen = h
        .wait_for_keys(&[
            format!("{}:user", p1.id),
            format!("{}:0", p1.id),
            format!("{}:user", p2.id),
            format!("{}:0", p2.id),
            format!("{}:loading", p2.id),
        ])
        .await;
    assert!(seen.iter().all(|u| !u.loading));
    let user = seen.last().unwrap().entries[2].entry.as_normalized().unwrap();
    assert_eq!(user.content, "follow up 5");
}

#[tokio::test]
async fn hidden_processes_stay_out_of_the_timeline() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);
    let dev = script(attempt, 1, ExecutionProcessStatus::Running, ScriptContext::DevServer);
    let mut dropped = agent(attempt, 2, ExecutionProcessStatus::Completed);
    dropped.dropped = true;
    h.client.register(p1.id, agent_store(vec![assistant("a")], true));
    h.client.register(dev.id, script_store(&["listening"], false));
    h.client
        .register(dropped.id, agent_store(vec![assistant("gone")], true));

    h.history.set_attempt(attempt);
    h.history
        .sync_processes(&[p1.clone(), dev.clone(), dropped.clone()])
        .unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(
        keys(&initial),
        vec![
            format!("{}:user", p1.id),
            format!("{}:0", p1.id),
            "next_action".to_string(),
        ]
    );
    assert_eq!(next_action(&initial), (false, 1, false, None));
    assert_eq!(h.client.opens(dev.id), 0);
    assert_eq!(h.client.opens(dropped.id), 0);
}

#[tokio::test]
async fn unreachable_history_shows_an_empty_process() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(
        keys(&initial),
        vec![format!("{}:user", p1.id), "next_action".to_string()]
    );
    assert!(!h.cache.contains(attempt, p1.id));
}

#[tokio::test]
async fn running_process_shows_before_its_first_entry() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    h.client.register(p1.id, agent_store(Vec::new(), false));

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(
        keys(&initial),
        vec![format!("{}:user", p1.id), format!("{}:loading", p1.id)]
    );
}

#[tokio::test]
async fn vanished_processes_are_removed() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);
    let p2 = agent(attempt, 1, ExecutionProcessStatus::Completed);
    h.client.register(p1.id, agent_store(vec![assistant("a")], true));
    h.client.register(p2.id, agent_store(vec![assistant("b")], true));

    h.history.set_attempt(attempt);
    h.history
        .sync_processes(&[p1.clone(), p2.clone()])
        .unwrap();
    let initial = h.wait_for_initial().await;
    assert_eq!(next_action(&initial).1, 2);

    h.history.sync_processes(&[p1.clone()]).unwrap();
    let update = h.wait_for(|_| true).await.pop().unwrap();
    assert_eq!(update.add_type, AddType::Running);
    assert!(
        update
            .entries
            .iter()
            .all(|entry| entry.process_id != Some(p2.id))
    );
    assert_eq!(next_action(&update).1, 1);
}

#[tokio::test]
async fn empty_attempt_still_gets_an_initial_emission() {
    let mut h = Harness::new();
    h.history.set_attempt(Uuid::new_v4());
    h.history.sync_processes(&[]).unwrap();

    let initial = h.wait_for_initial().await;
    assert_eq!(keys(&initial), vec!["next_action".to_string()]);
    assert!(!initial.loading);
    assert!(h.history.is_initial_loaded());
}

#[tokio::test]
async fn sync_requires_a_matching_attempt() {
    let h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);

    assert!(matches!(
        h.history.sync_processes(&[p1.clone()]),
        Err(HistoryError::NoActiveAttempt)
    ));

    h.history.set_attempt(Uuid::new_v4());
    match h.history.sync_processes(&[p1.clone()]) {
        Err(HistoryError::ForeignProcess {
            process_id,
            process_attempt_id,
            ..
        }) => {
            assert_eq!(process_id, p1.id);
            assert_eq!(process_attempt_id, attempt);
        }
        other => panic!("expected ForeignProcess, got {other:?}"),
    }
}

#[tokio::test]
async fn closing_detaches_from_the_attempt() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    let store = agent_store(Vec::new(), false);
    h.client.register(p1.id, store.clone());

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.wait_for_initial().await;

    h.history.close();
    assert_eq!(h.history.current_attempt(), None);
    store.push_patch(ConversationPatch::add_normalized_entry(0, assistant("late")));
    tokio::task::yield_now().await;
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn reappearing_process_gets_a_fresh_live_stream() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Running);
    h.client
        .register(p1.id, agent_store(vec![assistant("working")], false));
    let streaming = [
        format!("{}:user", p1.id),
        format!("{}:0", p1.id),
        format!("{}:loading", p1.id),
    ];

    h.history.set_attempt(attempt);
    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.wait_for_keys(&streaming).await;

    h.history.sync_processes(&[]).unwrap();
    h.wait_for_keys(&["next_action".to_string()]).await;

    h.history.sync_processes(&[p1.clone()]).unwrap();
    h.wait_for_keys(&streaming).await;
    assert_eq!(h.client.successful_opens(p1.id), 2);
}

#[tokio::test(start_paused = true)]
async fn live_batches_before_the_initial_load_are_marked_loading() {
    let mut h = Harness::new();
    let attempt = Uuid::new_v4();
    let p1 = agent(attempt, 0, ExecutionProcessStatus::Completed);
    let p2 = follow_up(attempt, 5, ExecutionProcessStatus::Running);
    h.client
        .register(p1.id, agent_store(vec![assistant("earlier")], true));
    h.client.delay_opens(p1.id, Duration::from_secs(5));
    h.client
        .register(p2.id, agent_store(vec![assistant("now")], false));

    h.history.set_attempt(attempt);
    h.history
        .sync_processes(&[p1.clone(), p2.clone()])
        .unwrap();

    let seen = h
        .wait_for(|update| update.add_type == AddType::Initial)
        .await;
    let (initial, early) = seen.split_last().expect("updates");
    assert!(!early.is_empty());
    for update in early {
        assert_eq!(update.add_type, AddType::Running);
        assert!(update.loading);
        assert!(
            update
                .entries
                .iter()
                .all(|entry| entry.process_id == Some(p2.id))
        );
    }

    assert!(!initial.loading);
    assert!(has_unique_keys(initial));
    assert_eq!(
        keys(initial),
        vec![
            format!("{}:user", p1.id),
            format!("{}:0", p1.id),
            format!("{}:user", p2.id),
            format!("{}:0", p2.id),
            format!("{}:loading", p2.id),
        ]
    );
}
