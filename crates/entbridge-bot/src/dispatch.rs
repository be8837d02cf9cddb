//! Event dispatch — the glue between transport events, the conversation
//! state machine, the store, and the assembler.
//!
//! Events for one user flow through a dedicated worker task, so they are
//! applied strictly in arrival order while unrelated users proceed
//! concurrently. The draft is written through to the store before any state
//! advance is committed or the next prompt goes out.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{mpsc, Mutex};

use entbridge_core::{
  draft::AttachmentRef,
  flow::{self, ConfirmOutcome, ConfirmSignal, FormStep, ProfileStep},
  profile::{DentistProfile, ProfilePatch, UserId},
  store::ReferralStore,
  submission::{SubmissionEntry, SubmissionStatus},
  summary,
};

use crate::{
  assembler::Assembler,
  error::{Error, Result},
  session::{ChatState, Session, Sessions},
  transport::{ChatId, Keyboard, SendOptions, Transport},
  ui::{self, Command, MenuAction},
};

// ─── Events ──────────────────────────────────────────────────────────────────

/// One inbound event, already flattened from the transport's wire shape.
#[derive(Debug)]
pub struct UserEvent {
  pub user:    UserId,
  pub chat:    ChatId,
  /// Public transport handle, when the sender exposes one.
  pub handle:  Option<String>,
  pub payload: EventPayload,
}

#[derive(Debug)]
pub enum EventPayload {
  Text(String),
  Attachment(AttachmentRef),
}

// ─── Bot ─────────────────────────────────────────────────────────────────────

/// Idle time after which a user's worker retires and the in-memory
/// conversation cursor is dropped. The persisted draft is unaffected.
const WORKER_IDLE: Duration = Duration::from_secs(30 * 60);

pub struct Bot<S, T> {
  store:             S,
  transport:         T,
  sessions:          Sessions,
  workers:           Mutex<HashMap<UserId, mpsc::UnboundedSender<UserEvent>>>,
  target:            ChatId,
  max_archive_bytes: u64,
  worker_idle:       Duration,
}

impl<S: ReferralStore, T: Transport> Bot<S, T> {
  pub fn new(store: S, transport: T, target: ChatId, max_archive_bytes: u64) -> Self {
    Self {
      store,
      transport,
      sessions: Sessions::new(),
      workers: Mutex::new(HashMap::new()),
      target,
      max_archive_bytes,
      worker_idle: WORKER_IDLE,
    }
  }

  #[cfg(test)]
  pub(crate) fn with_worker_idle(mut self, worker_idle: Duration) -> Self {
    self.worker_idle = worker_idle;
    self
  }

  /// Handle one event end to end. Failures are logged and answered with an
  /// apology; they never tear the loop down.
  pub async fn handle_event(&self, event: UserEvent) {
    let chat = event.chat;
    let user = event.user;
    if let Err(e) = self.dispatch(event).await {
      tracing::error!(user = %user, error = %e, "event handling failed");
      if let Err(e) = self
        .transport
        .send_message(chat, ui::APOLOGY, SendOptions::plain())
        .await
      {
        tracing::warn!(user = %user, error = %e, "could not deliver apology");
      }
    }
  }

  async fn dispatch(&self, event: UserEvent) -> Result<()> {
    let cell = self.sessions.entry(event.user).await;
    let mut session = cell.lock().await;

    match event.payload {
      EventPayload::Text(text) => {
        if let Some(command) = ui::parse_command(&text) {
          return self
            .handle_command(&mut session, event.user, event.chat, event.handle, command)
            .await;
        }
        self
          .handle_text(&mut session, event.user, event.chat, &text)
          .await
      }
      EventPayload::Attachment(attachment) => {
        self
          .handle_attachment(&mut session, event.user, event.chat, attachment)
          .await
      }
    }
  }

  // ── Commands ──────────────────────────────────────────────────────────────

  async fn handle_command(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    handle: Option<String>,
    command: Command,
  ) -> Result<()> {
    match command {
      Command::Start => {
        // Refresh the stored handle on every /start; it is the one profile
        // field the transport knows better than the dentist.
        let profile = self
          .store
          .upsert_profile(user, ProfilePatch::handle_only(handle))
          .await
          .map_err(Error::store)?;
        session.state = ChatState::Idle;

        self.send(chat, ui::GREETING, SendOptions::plain()).await?;
        let follow_up = if profile.is_blank() {
          ui::GREETING_BLANK_PROFILE
        } else {
          ui::GREETING_KNOWN_PROFILE
        };
        self
          .send(chat, follow_up, SendOptions::with_keyboard(Keyboard::Main))
          .await
      }
      Command::Fill => self.start_profile(session, chat).await,
      Command::New => self.start_consultation(session, user, chat).await,
      Command::Me => self.show_profile(user, chat).await,
      Command::List => self.list_submissions(user, chat).await,
      Command::View(arg) => self.view_submission(user, chat, &arg).await,
      Command::Cancel => {
        // The draft row stays put; /new offers to resume it.
        session.state = ChatState::Idle;
        self
          .send(chat, ui::ABORTED, SendOptions::with_keyboard(Keyboard::Main))
          .await
      }
    }
  }

  async fn start_profile(&self, session: &mut Session, chat: ChatId) -> Result<()> {
    session.state = ChatState::Profile {
      step:      ProfileStep::Name,
      full_name: None,
      phone:     None,
    };
    self
      .send(
        chat,
        ui::prompt_for_profile_step(ProfileStep::Name),
        SendOptions::with_keyboard(Keyboard::Remove),
      )
      .await
  }

  async fn start_consultation(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
  ) -> Result<()> {
    session.draft = self.store.load_draft(user).await.map_err(Error::store)?;

    let entry = flow::entry_step(&session.draft);
    session.state = ChatState::Form(entry);
    match entry {
      FormStep::Confirm => {
        self
          .send(
            chat,
            ui::RESUME_QUESTION,
            SendOptions::with_keyboard(Keyboard::Resume),
          )
          .await
      }
      step => self.send_step_prompt(chat, step).await,
    }
  }

  async fn show_profile(&self, user: UserId, chat: ChatId) -> Result<()> {
    let profile = self.store.get_profile(user).await.map_err(Error::store)?;
    self
      .send(
        chat,
        &profile_view(&profile),
        SendOptions::rich_with_keyboard(Keyboard::Main),
      )
      .await
  }

  async fn list_submissions(&self, user: UserId, chat: ChatId) -> Result<()> {
    let entries = self.store.list_submissions(user).await.map_err(Error::store)?;
    if entries.is_empty() {
      return self.send(chat, ui::NO_SUBMISSIONS, SendOptions::plain()).await;
    }

    let lines: Vec<String> =
      entries.iter().take(20).map(submission_line).collect();
    self.send(chat, &lines.join("\n"), SendOptions::plain()).await
  }

  async fn view_submission(&self, user: UserId, chat: ChatId, arg: &str) -> Result<()> {
    let found = match arg.trim().trim_start_matches('#').parse::<i64>() {
      Ok(id) => self.store.get_submission(id).await.map_err(Error::store)?,
      Err(_) => None,
    };

    // Entries are only shown to the identity that created them.
    match found.filter(|entry| entry.user_id == user) {
      Some(entry) => {
        self.send(chat, &submission_line(&entry), SendOptions::plain()).await
      }
      None => self.send(chat, ui::SUBMISSION_NOT_FOUND, SendOptions::plain()).await,
    }
  }

  // ── Plain text by state ───────────────────────────────────────────────────

  async fn handle_text(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    text: &str,
  ) -> Result<()> {
    match session.state.clone() {
      ChatState::Idle => match ui::menu_action(text) {
        Some(MenuAction::NewConsultation) => {
          self.start_consultation(session, user, chat).await
        }
        Some(MenuAction::EditProfile) => self.start_profile(session, chat).await,
        Some(MenuAction::MyDetails) => self.show_profile(user, chat).await,
        None => {
          self
            .send(chat, ui::CHOOSE_ACTION, SendOptions::with_keyboard(Keyboard::Main))
            .await
        }
      },
      ChatState::Profile { step, full_name, phone } => {
        self
          .handle_profile_answer(session, user, chat, step, full_name, phone, text)
          .await
      }
      ChatState::Form(step) if step.takes_text() => {
        self.handle_form_answer(session, user, chat, step, text).await
      }
      ChatState::Form(FormStep::Files) => {
        if ui::is_done(text) {
          self.enter_confirm(session, user, chat).await
        } else {
          self.send_step_prompt(chat, FormStep::Files).await
        }
      }
      ChatState::Form(FormStep::Confirm) => {
        match ui::confirm_signal(text) {
          Some(signal) => self.handle_confirm(session, user, chat, signal).await,
          None => self.send_step_prompt(chat, FormStep::Confirm).await,
        }
      }
      ChatState::Form(_) => unreachable!("text steps handled above"),
    }
  }

  async fn handle_profile_answer(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    step: ProfileStep,
    full_name: Option<String>,
    phone: Option<String>,
    text: &str,
  ) -> Result<()> {
    let answer = text.trim();
    if answer.is_empty() {
      self.send(chat, ui::EMPTY_ANSWER, SendOptions::plain()).await?;
      return self
        .send(chat, ui::prompt_for_profile_step(step), SendOptions::plain())
        .await;
    }

    // Answers accumulate in the session until the last step writes the
    // whole patch out at once.
    let (full_name, phone, workplace) = match step {
      ProfileStep::Name => (Some(answer.to_owned()), phone, None),
      ProfileStep::Phone => (full_name, Some(answer.to_owned()), None),
      ProfileStep::Workplace => (full_name, phone, Some(answer.to_owned())),
    };

    match step.next() {
      Some(next) => {
        session.state = ChatState::Profile { step: next, full_name, phone };
        self
          .send(chat, ui::prompt_for_profile_step(next), SendOptions::plain())
          .await
      }
      None => {
        self
          .store
          .upsert_profile(user, ProfilePatch {
            full_name,
            phone,
            workplace,
            handle: None,
          })
          .await
          .map_err(Error::store)?;
        session.state = ChatState::Idle;
        self
          .send(chat, ui::PROFILE_SAVED, SendOptions::with_keyboard(Keyboard::Main))
          .await
      }
    }
  }

  async fn handle_form_answer(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    step: FormStep,
    text: &str,
  ) -> Result<()> {
    // Mutate a copy, persist it, and only then commit to the session — a
    // failed write leaves both the store and the conversation where they
    // were.
    let mut updated = session.draft.clone();
    match flow::apply_text(&mut updated, step, text) {
      Ok(next) => {
        self
          .store
          .save_draft(user, updated.clone())
          .await
          .map_err(Error::store)?;
        session.draft = updated;
        session.state = ChatState::Form(next);
        self.send_step_prompt(chat, next).await
      }
      Err(entbridge_core::Error::EmptyAnswer(_)) => {
        self.send(chat, ui::EMPTY_ANSWER, SendOptions::plain()).await?;
        self.send_step_prompt(chat, step).await
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn handle_attachment(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    attachment: AttachmentRef,
  ) -> Result<()> {
    if session.state != ChatState::Form(FormStep::Files) {
      return self.send(chat, ui::FILES_ONLY_HINT, SendOptions::plain()).await;
    }

    let mut updated = session.draft.clone();
    updated.attachments.push(attachment);
    self
      .store
      .save_draft(user, updated.clone())
      .await
      .map_err(Error::store)?;
    session.draft = updated;

    self
      .send(chat, ui::FILE_ADDED, SendOptions::with_keyboard(Keyboard::Done))
      .await
  }

  // ── Confirm step ──────────────────────────────────────────────────────────

  async fn enter_confirm(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
  ) -> Result<()> {
    session.state = ChatState::Form(FormStep::Confirm);

    let profile = self.store.get_profile(user).await.map_err(Error::store)?;
    let preview = format!(
      "{}\n\n📎 Attached files: {}",
      summary::render_rich(&session.draft, &profile),
      session.draft.attachments.len(),
    );
    self
      .send(chat, &preview, SendOptions::rich_with_keyboard(Keyboard::Confirm))
      .await
  }

  async fn handle_confirm(
    &self,
    session: &mut Session,
    user: UserId,
    chat: ChatId,
    signal: ConfirmSignal,
  ) -> Result<()> {
    match flow::confirm_transition(&session.draft, signal) {
      ConfirmOutcome::Deliver => {
        let profile = self.store.get_profile(user).await.map_err(Error::store)?;
        let assembler =
          Assembler::new(&self.transport, self.target, self.max_archive_bytes);
        let outcome = assembler.deliver(&session.draft, &profile).await?;
        tracing::info!(user = %user, ?outcome, "consultation delivered");

        // Log and clear only after delivery succeeded; a failed delivery
        // keeps the draft intact for another attempt.
        self
          .store
          .append_submission(user, SubmissionStatus::Sent)
          .await
          .map_err(Error::store)?;
        self.store.clear_draft(user).await.map_err(Error::store)?;
        session.draft = Default::default();
        session.state = ChatState::Idle;
        self
          .send(chat, ui::SUBMITTED, SendOptions::with_keyboard(Keyboard::Main))
          .await
      }
      ConfirmOutcome::Discard => {
        self.store.clear_draft(user).await.map_err(Error::store)?;
        session.draft = Default::default();
        session.state = ChatState::Idle;
        self
          .send(chat, ui::CANCELLED, SendOptions::with_keyboard(Keyboard::Main))
          .await
      }
      ConfirmOutcome::StartOver => {
        self.store.clear_draft(user).await.map_err(Error::store)?;
        session.draft = Default::default();
        session.state = ChatState::Form(FormStep::Complaints);
        self.send(chat, ui::RESTARTING, SendOptions::plain()).await?;
        self.send_step_prompt(chat, FormStep::Complaints).await
      }
      ConfirmOutcome::Continue(step) => {
        session.state = ChatState::Form(step);
        self.send(chat, ui::CONTINUING, SendOptions::plain()).await?;
        self.send_step_prompt(chat, step).await
      }
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn send_step_prompt(&self, chat: ChatId, step: FormStep) -> Result<()> {
    let keyboard = match step {
      FormStep::Files => Keyboard::Done,
      FormStep::Confirm => Keyboard::Confirm,
      _ => Keyboard::Remove,
    };
    self
      .send(chat, ui::prompt_for_step(step), SendOptions::with_keyboard(keyboard))
      .await
  }

  async fn send(
    &self,
    chat: ChatId,
    text: &str,
    options: SendOptions<'_>,
  ) -> Result<()> {
    self.transport.send_message(chat, text, options).await?;
    Ok(())
  }
}

// ─── Per-user workers ────────────────────────────────────────────────────────

impl<S, T> Bot<S, T>
where
  S: ReferralStore + 'static,
  T: Transport + 'static,
{
  /// Hand one event to its user's worker, creating the worker on first
  /// contact. Returns as soon as the event is enqueued; events for one user
  /// are applied strictly in the order they were routed.
  pub async fn route_event(self: &Arc<Self>, event: UserEvent) {
    let user = event.user;
    let mut workers = self.workers.lock().await;

    let sender =
      workers.entry(user).or_insert_with(|| self.spawn_worker(user));
    if let Err(mpsc::error::SendError(event)) = sender.send(event) {
      // The worker retired between lookup and send; replace it.
      let sender = self.spawn_worker(user);
      let _ = sender.send(event);
      workers.insert(user, sender);
    }
  }

  fn spawn_worker(self: &Arc<Self>, user: UserId) -> mpsc::UnboundedSender<UserEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<UserEvent>();
    let bot = Arc::clone(self);

    tokio::spawn(async move {
      loop {
        match tokio::time::timeout(bot.worker_idle, rx.recv()).await {
          Ok(Some(event)) => bot.handle_event(event).await,
          Ok(None) => break,
          Err(_) => {
            // Retire only while holding the map lock, so routing cannot
            // enqueue onto a worker that is about to disappear.
            let mut workers = bot.workers.lock().await;
            if rx.is_empty() {
              workers.remove(&user);
              bot.sessions.remove(user).await;
              break;
            }
          }
        }
      }
    });

    tx
  }
}

// ─── Rendering helpers ───────────────────────────────────────────────────────

fn profile_view(profile: &DentistProfile) -> String {
  let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "—".to_owned());
  format!(
    "<b>Your details</b>\nName: {}\nPhone: {}\nWorkplace: {}",
    field(&profile.full_name),
    field(&profile.phone),
    field(&profile.workplace),
  )
}

fn submission_line(entry: &SubmissionEntry) -> String {
  let status = match entry.status {
    SubmissionStatus::Sent => "sent",
  };
  format!(
    "#{} · {} · {status}",
    entry.submission_id,
    entry.created_at.format("%Y-%m-%d %H:%M UTC"),
  )
}
