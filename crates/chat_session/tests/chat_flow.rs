mod support;

use std::fs;
use std::thread;
use std::time::Duration;

use chat_provider::{Message, ProviderError, Role};
use chat_provider_mock::{Script, ScriptedProvider};
use chat_session::{ChatSettings, INTERRUPTED_MARKER};
use conversation_store::{load_conversation, save_conversation};
use pretty_assertions::assert_eq;
use support::{texts_of, wait_until, ChatHarness, ScriptedEditor};
use tape_menu::MenuHost;

#[test]
fn streamed_chunks_extend_and_split_lines() {
    let provider =
        ScriptedProvider::new().with_script(Script::from_text_chunks(["Hel", "lo\nWor", "ld"]));
    let mut harness = ChatHarness::new(provider);

    harness.send("hi");
    harness.pump_until_idle();

    let session = harness.session();
    assert_eq!(texts_of(session.lines(), 0), vec!["hi"]);
    assert_eq!(texts_of(session.lines(), 1), vec!["Hello", "World"]);
    let subindexes: Vec<usize> = session
        .lines()
        .iter()
        .filter(|line| line.msg_index == 1)
        .map(|line| line.subindex)
        .collect();
    assert_eq!(subindexes, vec![0, 1]);
    assert_eq!(session.messages()[1].text, "Hello\nWorld");
    assert_eq!(session.messages()[1].role, Role::Assistant);
    assert_eq!(session.menu().message(), "done");
    assert_eq!(session.menu().input().text(), "");
    assert_eq!(session.last_response(), Some("Hello\nWorld"));
    assert!(session.menu().follow());

    let persisted = load_conversation(session.chat_file()).expect("persisted");
    assert_eq!(persisted, session.messages());
}

#[test]
fn escape_commits_the_partial_answer_once() {
    let provider = ScriptedProvider::new()
        .with_script(Script::from_text_chunks(["Hel", "lo"]).hold_open());
    let mut harness = ChatHarness::new(provider);

    harness.send("hi");
    harness.pump_until("both chunks", |session| {
        texts_of(session.lines(), 1) == vec!["Hello".to_string()]
    });
    assert!(harness.session().is_generating());

    harness.press("\x1b");

    let session = harness.session();
    assert!(!session.is_generating());
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].text, format!("Hello\n{INTERRUPTED_MARKER}"));
    assert_eq!(texts_of(session.lines(), 1), vec!["Hello", INTERRUPTED_MARKER]);
    assert_eq!(session.menu().message(), "cancelled");
    assert!(!session.menu().is_finished());

    assert!(!harness.session_mut().cancel_generation());
    thread::sleep(Duration::from_millis(30));
    for _ in 0..5 {
        harness.pump();
    }
    assert_eq!(harness.session().messages().len(), 2);
    assert_eq!(
        load_conversation(harness.session().chat_file()).expect("persisted").len(),
        2
    );
}

#[test]
fn enter_is_ignored_while_generating() {
    let provider =
        ScriptedProvider::new().with_script(Script::from_text_chunks(["slow"]).hold_open());
    let mut harness = ChatHarness::new(provider);

    harness.send("first");
    harness.send("second");

    let session = harness.session();
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.menu().input().text(), "second");
    assert!(session.is_generating());
}

#[test]
fn editing_a_user_message_truncates_and_regenerates() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    let path = harness.dir.path().join("saved.json");
    save_conversation(
        &path,
        &[
            Message::assistant("welcome"),
            Message::user("first"),
            Message::assistant("answer"),
            Message::user("second"),
        ],
    )
    .expect("save");
    harness.session_mut().load_conversation(&path).expect("load");
    harness.pump();

    assert!(harness.session_mut().edit_message(1, "first, revised"));
    assert_eq!(harness.session().messages().len(), 2);
    assert!(harness.session().is_generating());

    harness.pump_until_idle();
    let session = harness.session();
    assert_eq!(session.messages().len(), 3);
    assert_eq!(session.messages()[1].text, "first, revised");
    assert_eq!(session.messages()[2].text, "first, revised");
    assert_eq!(load_conversation(&path).expect("persisted").len(), 3);
}

#[test]
fn editing_an_assistant_message_does_not_regenerate() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    harness.send("hello");
    harness.pump_until_idle();

    assert!(harness.session_mut().edit_message(1, "corrected"));
    assert!(!harness.session().is_generating());
    assert!(!harness.session_mut().edit_message(1, "corrected"));
    assert!(!harness.session_mut().edit_message(9, "nothing"));
    assert_eq!(harness.session().messages()[1].text, "corrected");
    assert_eq!(harness.provider.requests().len(), 1);
}

#[test]
fn external_editor_runs_on_the_selected_message() {
    let editor = ScriptedEditor::new("hello again");
    let seen = editor.seen.clone();
    let mut harness = ChatHarness::build(ScriptedProvider::new(), |_| {}, |session| {
        session.with_editor(editor)
    });
    harness.send("hello");
    harness.pump_until_idle();

    harness.session_mut().menu_mut().select_item_index(0);
    harness.press("\x1be");
    harness.pump_until_idle();

    assert_eq!(support::lock_unpoisoned(&seen).clone(), vec!["hello".to_string()]);
    let messages = harness.session().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "hello again");
    assert_eq!(messages[1].text, "hello again");
}

#[test]
fn context_and_images_ride_on_the_next_message_and_return_on_revert() {
    let mut harness = ChatHarness::with_options(ScriptedProvider::new(), |options| {
        options.context = vec!["ctx".to_string()];
        options.image_urls = vec!["https://example.test/cat.png".to_string()];
    });
    harness.pump();
    assert_eq!(harness.session().prompt_text(), "u (1 context) (1 images)");

    harness.send("hi");
    harness.pump_until_idle();

    let session = harness.session();
    assert_eq!(session.prompt_text(), "u");
    assert_eq!(session.messages()[0].context, vec!["ctx"]);
    assert_eq!(
        texts_of(session.lines(), 0),
        vec![
            "hi",
            "► context: “ctx”",
            "► image: https://example.test/cat.png...",
        ]
    );
    let request = &harness.provider.requests()[0];
    assert_eq!(request.messages[0].text, "hi\n---\nctx");
    assert_eq!(request.model, "test-model");

    let removed = harness.session_mut().revert_messages(0);
    assert_eq!(removed.len(), 2);
    let session = harness.session();
    assert!(session.messages().is_empty());
    assert!(session.lines().is_empty());
    assert_eq!(session.menu().input().text(), "hi");
    assert_eq!(session.pending_context(), &["ctx".to_string()]);
    assert_eq!(session.pending_images().len(), 1);
}

#[test]
fn reverting_from_an_assistant_message_clears_the_input() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    harness.send("hi");
    harness.pump_until_idle();
    harness.session_mut().menu_mut().set_input("draft");

    let removed = harness.session_mut().revert_messages(1);

    assert_eq!(removed.len(), 1);
    assert_eq!(harness.session().messages().len(), 1);
    assert_eq!(harness.session().menu().input().text(), "");
    assert!(harness.session_mut().revert_messages(5).is_empty());
}

#[test]
fn message_navigation_jumps_between_first_lines() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    let path = harness.dir.path().join("nav.json");
    save_conversation(
        &path,
        &[
            Message::user("q1\nmore"),
            Message::assistant("a1\nmore\nmore"),
            Message::user("q2"),
        ],
    )
    .expect("save");
    harness.session_mut().load_conversation(&path).expect("load");
    harness.pump();

    let session = harness.session_mut();
    assert_eq!(session.menu().selected_index(), Some(5));
    assert!(session.goto_message(false));
    assert_eq!(session.menu().selected_index(), Some(2));
    assert!(session.goto_message(false));
    assert_eq!(session.menu().selected_index(), Some(0));
    assert!(!session.goto_message(false));
    assert!(session.goto_message(true));
    assert_eq!(session.menu().selected_index(), Some(2));
    assert_eq!(session.line_number_text(3, &session.lines()[3]), " ");
    assert_eq!(session.line_number_text(2, &session.lines()[2]), "2");
}

#[test]
fn retry_setting_restarts_a_failed_generation() {
    let provider = ScriptedProvider::new()
        .with_script(Script::new().text("par").fail(ProviderError::transport("reset")))
        .with_script(Script::from_text_chunks(["ok"]));
    let mut harness = ChatHarness::build(
        provider,
        |options| {
            let settings = ChatSettings {
                model: "m".to_string(),
                web_search: false,
                retry: true,
            };
            settings
                .save(&options.data_dir.join("settings.json"))
                .expect("settings");
        },
        |session| session,
    );

    harness.send("hi");
    harness.pump_until("retried answer", |session| {
        !session.is_busy() && session.messages().len() == 2
    });

    let session = harness.session();
    assert_eq!(session.retry_count(), 1);
    assert_eq!(session.messages()[1].text, "ok");
    assert_eq!(texts_of(session.lines(), 1), vec!["ok"]);
    assert_eq!(harness.provider.requests().len(), 2);
}

#[test]
fn failure_without_retry_asks_and_can_be_dismissed() {
    let provider = ScriptedProvider::new().with_script(Script::new().text("par").fail(
        ProviderError::Status {
            status: 503,
            message: "overloaded".to_string(),
        },
    ));
    let mut harness = ChatHarness::new(provider);

    harness.send("hi");
    let handle = harness.generation_handle();
    wait_until("stream end", || handle.is_finished());

    // Down + Enter picks "dismiss" in the error prompt.
    harness.events.push_keys("\x1b[B\r");
    harness.pump();

    let session = harness.session();
    assert!(!session.is_busy());
    assert_eq!(session.messages().len(), 1);
    assert_eq!(texts_of(session.lines(), 1), Vec::<String>::new());
    assert!(session.menu().message().starts_with("error: provider returned status 503"));
}

#[test]
fn failure_prompt_can_retry() {
    let provider = ScriptedProvider::new()
        .with_script(Script::new().fail(ProviderError::transport("reset")));
    let mut harness = ChatHarness::new(provider);

    harness.send("hi");
    let handle = harness.generation_handle();
    wait_until("stream end", || handle.is_finished());

    harness.events.push_keys("\r");
    harness.pump();
    harness.pump_until_idle();

    let session = harness.session();
    assert_eq!(session.retry_count(), 1);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].text, "hi");
}

#[test]
fn out_file_receives_the_answer_and_closes_the_menu() {
    let mut harness = ChatHarness::with_options(ScriptedProvider::new(), |options| {
        options.first_message = Some("ping".to_string());
        options.out_file = Some(options.data_dir.join("answer.txt"));
    });

    harness.pump_until("menu closed", |session| session.menu().is_finished());

    let out = harness.dir.path().join("data").join("answer.txt");
    assert_eq!(fs::read_to_string(out).expect("out file"), "ping");
}

#[test]
fn new_conversation_starts_a_fresh_file() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    harness.send("hi");
    harness.pump_until_idle();
    let first_file = harness.session().chat_file().to_path_buf();

    harness.press("\x0e");

    let session = harness.session();
    assert!(session.messages().is_empty());
    assert!(session.lines().is_empty());
    assert_ne!(session.chat_file(), first_file.as_path());
    assert_eq!(load_conversation(&first_file).expect("old file").len(), 2);
}

#[test]
fn saved_conversations_load_from_the_picker() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    let save_dir = harness.session().history().save_dir().to_path_buf();
    let saved = vec![Message::user("old question"), Message::assistant("old answer")];
    save_conversation(&save_dir.join("release-plan.json"), &saved).expect("save");

    harness.events.push_keys("\x0c\r");
    harness.pump();

    let session = harness.session();
    assert_eq!(session.messages(), saved.as_slice());
    assert!(session.chat_file().ends_with("release-plan.json"));
    assert_eq!(texts_of(session.lines(), 1), vec!["old answer"]);
}

#[test]
fn settings_toggle_from_the_picker_and_persist() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    harness.events.push_keys("\x1bs\r");
    harness.pump();

    let session = harness.session();
    assert!(session.settings().retry);
    let settings_path = harness.dir.path().join("data").join("settings.json");
    assert!(ChatSettings::load(&settings_path).expect("settings").retry);
    assert!(session
        .status_text()
        .starts_with("chat: model=test-model retry=true web_search=false\n"));
}

#[test]
fn save_as_names_the_history_file() {
    let mut harness = ChatHarness::new(ScriptedProvider::new());
    harness.send("hi");
    harness.pump_until_idle();

    let path = harness.session_mut().save_as("Release plan").expect("save as");

    assert!(path.ends_with("release-plan.json"));
    assert_eq!(load_conversation(&path).expect("load").len(), 2);
    assert!(harness.session().menu().message().starts_with("chat saved to "));
}
