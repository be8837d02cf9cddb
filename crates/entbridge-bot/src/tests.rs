use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use bytes::Bytes;
use entbridge_core::{
  draft::{AttachmentKind, AttachmentRef, Draft},
  profile::{DentistProfile, UserId},
  store::ReferralStore,
  submission::SubmissionStatus,
};
use entbridge_store_sqlite::SqliteStore;

use crate::{
  assembler::{Assembler, DeliveryOutcome, MEDIA_GROUP_LIMIT},
  dispatch::{Bot, EventPayload, UserEvent},
  transport::{
    ChatId, FileInfo, OutgoingDocument, OutgoingMedia, SendOptions, Transport,
    TransportError,
  },
  ui,
};

// ─── Mock transport ───────────────────────────────────────────────────────────

#[derive(Debug)]
enum Call {
  Download(String),
  Document { filename: String, caption: String, bytes: usize },
  MediaGroup { refs: Vec<String>, first_caption: Option<String> },
  Message { text: String, has_link_button: bool },
}

#[derive(Default)]
struct MockInner {
  calls:            Mutex<Vec<Call>>,
  sizes:            Mutex<HashMap<String, u64>>,
  fail_document:    Mutex<Option<TransportError>>,
  fail_link_button: Mutex<bool>,
}

#[derive(Clone, Default)]
struct MockTransport {
  inner: Arc<MockInner>,
}

impl MockTransport {
  fn set_size(&self, file_ref: &str, size: u64) {
    self.inner.sizes.lock().unwrap().insert(file_ref.to_owned(), size);
  }

  fn fail_next_document(&self, error: TransportError) {
    *self.inner.fail_document.lock().unwrap() = Some(error);
  }

  fn fail_next_link_button(&self) {
    *self.inner.fail_link_button.lock().unwrap() = true;
  }

  fn with_calls<R>(&self, f: impl FnOnce(&[Call]) -> R) -> R {
    f(&self.inner.calls.lock().unwrap())
  }

  fn message_texts(&self) -> Vec<String> {
    self.with_calls(|calls| {
      calls
        .iter()
        .filter_map(|c| match c {
          Call::Message { text, .. } => Some(text.clone()),
          _ => None,
        })
        .collect()
    })
  }

  fn last_message(&self) -> String {
    self.message_texts().last().cloned().unwrap_or_default()
  }

  fn documents(&self) -> Vec<(String, String)> {
    self.with_calls(|calls| {
      calls
        .iter()
        .filter_map(|c| match c {
          Call::Document { filename, caption, .. } => {
            Some((filename.clone(), caption.clone()))
          }
          _ => None,
        })
        .collect()
    })
  }

  fn media_groups(&self) -> Vec<(Vec<String>, Option<String>)> {
    self.with_calls(|calls| {
      calls
        .iter()
        .filter_map(|c| match c {
          Call::MediaGroup { refs, first_caption } => {
            Some((refs.clone(), first_caption.clone()))
          }
          _ => None,
        })
        .collect()
    })
  }

  fn record(&self, call: Call) {
    self.inner.calls.lock().unwrap().push(call);
  }
}

impl Transport for MockTransport {
  async fn file_info(&self, file_ref: &str) -> Result<FileInfo, TransportError> {
    let size = self.inner.sizes.lock().unwrap().get(file_ref).copied();
    Ok(FileInfo {
      file_ref: file_ref.to_owned(),
      size,
      path: Some(format!("files/{file_ref}")),
    })
  }

  async fn download(&self, info: &FileInfo) -> Result<Bytes, TransportError> {
    self.record(Call::Download(info.file_ref.clone()));
    Ok(Bytes::from_static(b"content"))
  }

  async fn send_document(
    &self,
    _chat: ChatId,
    document: OutgoingDocument<'_>,
  ) -> Result<(), TransportError> {
    if let Some(error) = self.inner.fail_document.lock().unwrap().take() {
      return Err(error);
    }
    self.record(Call::Document {
      filename: document.filename.to_owned(),
      caption:  document.caption.to_owned(),
      bytes:    document.bytes.len(),
    });
    Ok(())
  }

  async fn send_media_group(
    &self,
    _chat: ChatId,
    items: &[OutgoingMedia<'_>],
  ) -> Result<(), TransportError> {
    self.record(Call::MediaGroup {
      refs:          items.iter().map(|i| i.file_ref.to_owned()).collect(),
      first_caption: items.first().and_then(|i| i.caption.map(str::to_owned)),
    });
    Ok(())
  }

  async fn send_message(
    &self,
    _chat: ChatId,
    text: &str,
    options: SendOptions<'_>,
  ) -> Result<(), TransportError> {
    let has_link_button = options.link_button.is_some();
    if has_link_button {
      let mut fail = self.inner.fail_link_button.lock().unwrap();
      if *fail {
        *fail = false;
        return Err(TransportError::Rejected("buttons unavailable".into()));
      }
    }
    self.record(Call::Message { text: text.to_owned(), has_link_button });
    Ok(())
  }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

const MAX: u64 = 1000;

fn profile() -> DentistProfile {
  DentistProfile {
    user_id:   UserId(7),
    full_name: Some("Dr. Test".into()),
    phone:     Some("+1 555 0100".into()),
    workplace: Some("Clinic".into()),
    handle:    Some("drtest".into()),
  }
}

fn draft_with_attachments(n: usize) -> Draft {
  Draft {
    complaints: Some("pain".into()),
    history: Some("none".into()),
    plan: Some("implant".into()),
    attachments: (1..=n)
      .map(|i| AttachmentRef {
        file_ref: format!("f{i}"),
        kind:     AttachmentKind::Photo,
      })
      .collect(),
  }
}

// ─── Assembler ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn under_threshold_delivers_archive() {
  let mock = MockTransport::default();
  mock.set_size("f1", 400);
  mock.set_size("f2", 500);

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(2), &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::Archive);
  let docs = mock.documents();
  assert_eq!(docs.len(), 1);
  assert_eq!(docs[0].0, "ent_consultation.zip");
  assert!(docs[0].1.contains("pain"));
  assert!(mock.media_groups().is_empty());
}

#[tokio::test]
async fn total_exactly_at_threshold_still_archives() {
  let mock = MockTransport::default();
  mock.set_size("f1", MAX);

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(1), &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::Archive);
}

#[tokio::test]
async fn one_byte_over_threshold_falls_back_to_media_groups() {
  let mock = MockTransport::default();
  mock.set_size("f1", MAX + 1);

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(1), &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::MediaGroups { batches: 1 });
  assert!(mock.documents().is_empty());
}

#[tokio::test]
async fn media_groups_batch_in_order_with_one_caption() {
  let mock = MockTransport::default();
  let draft = draft_with_attachments(25);
  for att in &draft.attachments {
    mock.set_size(&att.file_ref, 100);
  }

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft, &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::MediaGroups { batches: 3 });
  let groups = mock.media_groups();
  assert_eq!(
    groups.iter().map(|(refs, _)| refs.len()).collect::<Vec<_>>(),
    [MEDIA_GROUP_LIMIT, MEDIA_GROUP_LIMIT, 5],
  );

  // Original order, exactly one caption on the first item overall.
  let flat: Vec<&str> = groups
    .iter()
    .flat_map(|(refs, _)| refs.iter().map(String::as_str))
    .collect();
  let expected: Vec<String> = (1..=25).map(|i| format!("f{i}")).collect();
  assert_eq!(flat, expected.iter().map(String::as_str).collect::<Vec<_>>());
  assert!(groups[0].1.is_some());
  assert!(groups[1].1.is_none());
  assert!(groups[2].1.is_none());
}

#[tokio::test]
async fn zero_attachments_still_produce_an_archive() {
  let mock = MockTransport::default();
  let draft = draft_with_attachments(0);

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft, &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::Archive);
  // The archive holds just the summary file, and is still non-empty.
  let docs = mock.documents();
  assert_eq!(docs.len(), 1);
}

#[tokio::test]
async fn payload_rejection_switches_to_media_groups() {
  let mock = MockTransport::default();
  mock.set_size("f1", 100);
  mock.fail_next_document(TransportError::PayloadRejected("too big".into()));

  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(1), &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::MediaGroups { batches: 1 });
}

#[tokio::test]
async fn permanent_rejection_propagates() {
  let mock = MockTransport::default();
  mock.set_size("f1", 100);
  mock.fail_next_document(TransportError::Rejected(
    "bot was blocked by the user".into(),
  ));

  let err = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(1), &profile())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    crate::Error::Transport(TransportError::Rejected(_))
  ));
  assert!(mock.media_groups().is_empty());
}

#[tokio::test]
async fn unreported_sizes_count_as_zero() {
  let mock = MockTransport::default();
  // No sizes registered at all: the archive path is attempted.
  let outcome = Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(3), &profile())
    .await
    .unwrap();

  assert_eq!(outcome, DeliveryOutcome::Archive);
}

#[tokio::test]
async fn refused_link_button_degrades_to_plain_link() {
  let mock = MockTransport::default();
  mock.set_size("f1", MAX + 1);
  mock.fail_next_link_button();

  Assembler::new(&mock, ChatId(1), MAX)
    .deliver(&draft_with_attachments(1), &profile())
    .await
    .unwrap();

  let last = mock.with_calls(|calls| {
    calls
      .iter()
      .rev()
      .find_map(|c| match c {
        Call::Message { text, has_link_button } => {
          Some((text.clone(), *has_link_button))
        }
        _ => None,
      })
      .unwrap()
  });
  assert!(!last.1);
  assert!(last.0.contains("https://t.me/drtest"));
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

const USER: i64 = 42;

async fn bot() -> (Bot<SqliteStore, MockTransport>, SqliteStore, MockTransport) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let mock = MockTransport::default();
  let bot = Bot::new(store.clone(), mock.clone(), ChatId(999), MAX);
  (bot, store, mock)
}

fn text_event(text: &str) -> UserEvent {
  UserEvent {
    user:    UserId(USER),
    chat:    ChatId(USER),
    handle:  Some("drtest".into()),
    payload: EventPayload::Text(text.into()),
  }
}

async fn say(bot: &Bot<SqliteStore, MockTransport>, text: &str) {
  bot.handle_event(text_event(text)).await;
}

async fn route(bot: &Arc<Bot<SqliteStore, MockTransport>>, text: &str) {
  bot.route_event(text_event(text)).await;
}

/// Poll the store until the draft satisfies `ready`; the worker drains its
/// queue asynchronously.
async fn drained_draft(store: &SqliteStore, ready: fn(&Draft) -> bool) -> Draft {
  for _ in 0..200 {
    let draft = store.load_draft(UserId(USER)).await.unwrap();
    if ready(&draft) {
      return draft;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("draft never reached the expected shape");
}

async fn drained_message(mock: &MockTransport, expected: &str) {
  for _ in 0..200 {
    if mock.last_message() == expected {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("message {expected:?} never arrived; got {:?}", mock.message_texts());
}

async fn attach(bot: &Bot<SqliteStore, MockTransport>, file_ref: &str) {
  bot
    .handle_event(UserEvent {
      user:    UserId(USER),
      chat:    ChatId(USER),
      handle:  Some("drtest".into()),
      payload: EventPayload::Attachment(AttachmentRef {
        file_ref: file_ref.into(),
        kind:     AttachmentKind::Document,
      }),
    })
    .await;
}

#[tokio::test]
async fn full_flow_submits_logs_and_clears() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "sinus pressure after implant").await;
  say(&bot, "no prior ENT history").await;
  say(&bot, "sinus lift, two implants").await;
  say(&bot, "Done").await;
  say(&bot, "✅ Send").await;

  let docs = mock.documents();
  assert_eq!(docs.len(), 1);
  for needle in [
    "sinus pressure after implant",
    "no prior ENT history",
    "sinus lift, two implants",
  ] {
    assert!(docs[0].1.contains(needle), "missing {needle:?}");
  }

  let log = store.list_submissions(UserId(USER)).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].status, SubmissionStatus::Sent);

  assert_eq!(store.load_draft(UserId(USER)).await.unwrap(), Draft::default());
  assert_eq!(mock.last_message(), ui::SUBMITTED);
}

#[tokio::test]
async fn new_offers_resume_and_skips_filled_steps() {
  let (bot, store, mock) = bot().await;
  store
    .save_draft(UserId(USER), Draft {
      complaints: Some("pain".into()),
      history: Some("none".into()),
      ..Draft::default()
    })
    .await
    .unwrap();

  say(&bot, "/new").await;
  assert_eq!(mock.last_message(), ui::RESUME_QUESTION);

  say(&bot, "▶️ Continue").await;
  // Complaints and history are answered; resume lands on the plan step.
  assert_eq!(
    mock.last_message(),
    ui::prompt_for_step(entbridge_core::flow::FormStep::Plan)
  );
}

#[tokio::test]
async fn empty_answer_is_rejected_and_reprompted() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "   \n ").await;

  let texts = mock.message_texts();
  assert!(texts.contains(&ui::EMPTY_ANSWER.to_owned()));
  assert_eq!(
    mock.last_message(),
    ui::prompt_for_step(entbridge_core::flow::FormStep::Complaints)
  );
  assert_eq!(store.load_draft(UserId(USER)).await.unwrap(), Draft::default());
}

#[tokio::test]
async fn cancel_at_confirm_discards_the_draft() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "pain").await;
  say(&bot, "none").await;
  say(&bot, "implant").await;
  say(&bot, "Done").await;
  say(&bot, "❌ Cancel").await;

  assert_eq!(store.load_draft(UserId(USER)).await.unwrap(), Draft::default());
  assert!(store.list_submissions(UserId(USER)).await.unwrap().is_empty());
  assert_eq!(mock.last_message(), ui::CANCELLED);
}

#[tokio::test]
async fn slash_cancel_keeps_the_draft_for_resumption() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "pain").await;
  say(&bot, "/cancel").await;

  let kept = store.load_draft(UserId(USER)).await.unwrap();
  assert_eq!(kept.complaints.as_deref(), Some("pain"));

  say(&bot, "/new").await;
  assert_eq!(mock.last_message(), ui::RESUME_QUESTION);
}

#[tokio::test]
async fn start_over_resets_to_the_first_step() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "pain").await;
  say(&bot, "/new").await;
  say(&bot, "🔄 Start over").await;

  assert_eq!(store.load_draft(UserId(USER)).await.unwrap(), Draft::default());
  assert_eq!(
    mock.last_message(),
    ui::prompt_for_step(entbridge_core::flow::FormStep::Complaints)
  );
}

#[tokio::test]
async fn attachments_only_accepted_at_the_files_step() {
  let (bot, store, mock) = bot().await;

  attach(&bot, "early").await;
  assert_eq!(mock.last_message(), ui::FILES_ONLY_HINT);
  assert_eq!(store.load_draft(UserId(USER)).await.unwrap(), Draft::default());

  say(&bot, "/new").await;
  say(&bot, "pain").await;
  say(&bot, "none").await;
  say(&bot, "implant").await;
  attach(&bot, "scan1").await;
  attach(&bot, "scan2").await;
  assert_eq!(mock.last_message(), ui::FILE_ADDED);

  let draft = store.load_draft(UserId(USER)).await.unwrap();
  assert_eq!(draft.attachments.len(), 2);
  assert_eq!(draft.attachments[0].file_ref, "scan1");
}

#[tokio::test]
async fn attached_files_travel_with_the_submission() {
  let (bot, _store, mock) = bot().await;

  say(&bot, "/new").await;
  say(&bot, "pain").await;
  say(&bot, "none").await;
  say(&bot, "implant").await;
  attach(&bot, "scan1").await;
  attach(&bot, "scan2").await;
  say(&bot, "Done").await;
  say(&bot, "✅ Send").await;

  let downloads = mock.with_calls(|calls| {
    calls
      .iter()
      .filter(|c| matches!(c, Call::Download(_)))
      .count()
  });
  assert_eq!(downloads, 2);
  assert_eq!(mock.documents().len(), 1);
}

#[tokio::test]
async fn profile_path_collects_three_answers_in_one_write() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/fill").await;
  say(&bot, "Dr. Who").await;
  say(&bot, "+1 555 0123").await;
  say(&bot, "Gallifrey Dental, London").await;

  assert_eq!(mock.last_message(), ui::PROFILE_SAVED);
  let profile = store.get_profile(UserId(USER)).await.unwrap();
  assert_eq!(profile.full_name.as_deref(), Some("Dr. Who"));
  assert_eq!(profile.phone.as_deref(), Some("+1 555 0123"));
  assert_eq!(profile.workplace.as_deref(), Some("Gallifrey Dental, London"));
}

#[tokio::test]
async fn start_refreshes_the_stored_handle() {
  let (bot, store, mock) = bot().await;

  say(&bot, "/start").await;

  let profile = store.get_profile(UserId(USER)).await.unwrap();
  assert_eq!(profile.handle.as_deref(), Some("drtest"));
  // Blank profile: the greeting steers toward filling it in.
  assert_eq!(mock.last_message(), ui::GREETING_BLANK_PROFILE);
}

#[tokio::test]
async fn view_handles_unknown_and_malformed_ids() {
  let (bot, _store, mock) = bot().await;

  say(&bot, "/view 999").await;
  assert_eq!(mock.last_message(), ui::SUBMISSION_NOT_FOUND);

  say(&bot, "/view not-a-number").await;
  assert_eq!(mock.last_message(), ui::SUBMISSION_NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn burst_from_one_user_applies_in_arrival_order() {
  let (bot, store, _mock) = bot().await;
  let bot = Arc::new(bot);

  // All four arrive in one poll round; routing must preserve their order
  // even though handling happens on a separate task.
  for text in [
    "/new",
    "first the complaints",
    "then the history",
    "finally the plan",
  ] {
    route(&bot, text).await;
  }

  let draft = drained_draft(&store, |d| d.plan.is_some()).await;
  assert_eq!(draft.complaints.as_deref(), Some("first the complaints"));
  assert_eq!(draft.history.as_deref(), Some("then the history"));
  assert_eq!(draft.plan.as_deref(), Some("finally the plan"));
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_workers_retire_but_the_draft_survives() {
  let (bot, store, mock) = bot().await;
  let bot = Arc::new(bot.with_worker_idle(Duration::from_millis(250)));

  route(&bot, "/new").await;
  route(&bot, "pain").await;
  drained_draft(&store, |d| d.complaints.is_some()).await;

  // Let the worker retire and drop the conversation cursor.
  tokio::time::sleep(Duration::from_secs(1)).await;

  // A fresh worker starts from the idle state...
  route(&bot, "hello again").await;
  drained_message(&mock, ui::CHOOSE_ACTION).await;

  // ...while the persisted draft is still there to resume.
  let kept = store.load_draft(UserId(USER)).await.unwrap();
  assert_eq!(kept.complaints.as_deref(), Some("pain"));
  route(&bot, "/new").await;
  drained_message(&mock, ui::RESUME_QUESTION).await;
}

#[tokio::test]
async fn list_shows_newest_first() {
  let (bot, store, mock) = bot().await;
  store
    .append_submission(UserId(USER), SubmissionStatus::Sent)
    .await
    .unwrap();
  store
    .append_submission(UserId(USER), SubmissionStatus::Sent)
    .await
    .unwrap();

  say(&bot, "/list").await;
  let listing = mock.last_message();
  let first = listing.lines().next().unwrap();
  let second = listing.lines().nth(1).unwrap();
  assert!(first.starts_with("#2"));
  assert!(second.starts_with("#1"));
}
