//! The bundle assembler.
//!
//! Given a completed draft, produces either a single compressed archive or,
//! when the attachments are too large, a sequence of grouped media messages,
//! and delivers it to the target chat. The draft is borrowed read-only for
//! one delivery attempt; nothing is persisted here.

use std::io::{Cursor, Write as _};

use bytes::Bytes;
use entbridge_core::{
  draft::{AttachmentKind, Draft},
  profile::DentistProfile,
  summary,
};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
  error::{Error, Result},
  transport::{
    ChatId, FileInfo, LinkButton, OutgoingDocument, OutgoingMedia, SendOptions,
    Transport,
  },
  ui,
};

/// Hard ceiling on items per grouped-media batch.
pub const MEDIA_GROUP_LIMIT: usize = 10;

const ARCHIVE_FILENAME: &str = "ent_consultation.zip";

/// Which delivery strategy a submission ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
  /// One compressed archive, summary file first.
  Archive,
  /// Grouped media messages, `batches` of them.
  MediaGroups { batches: usize },
}

pub struct Assembler<'a, T: Transport> {
  transport:         &'a T,
  target:            ChatId,
  max_archive_bytes: u64,
}

impl<'a, T: Transport> Assembler<'a, T> {
  pub fn new(transport: &'a T, target: ChatId, max_archive_bytes: u64) -> Self {
    Self { transport, target, max_archive_bytes }
  }

  /// Assemble the bundle for `draft` and deliver it to the target chat.
  pub async fn deliver(
    &self,
    draft: &Draft,
    profile: &DentistProfile,
  ) -> Result<DeliveryOutcome> {
    let rich = summary::render_rich(draft, profile);
    let plain = summary::strip_markup(&rich);
    let caption = summary::capped_caption(&rich);
    let contact = summary::contact_url(profile);

    // Probe sizes without downloading anything yet. An unreported size
    // counts as zero, which biases toward attempting the archive path.
    let mut infos: Vec<FileInfo> = Vec::with_capacity(draft.attachments.len());
    let mut total: u64 = 0;
    for att in &draft.attachments {
      let info = self.transport.file_info(&att.file_ref).await?;
      total += info.size.unwrap_or(0);
      infos.push(info);
    }

    if total > self.max_archive_bytes {
      return self
        .deliver_media_groups(draft, &rich, &caption, contact.as_deref())
        .await;
    }

    match self
      .deliver_archive(draft, &infos, &plain, &caption, contact.as_deref())
      .await
    {
      Ok(()) => Ok(DeliveryOutcome::Archive),
      // A transient failure or a payload rejection switches strategy
      // instead of surfacing; anything else propagates.
      Err(Error::Transport(e)) if e.is_recoverable() => {
        tracing::warn!(error = %e, "archive delivery failed, falling back to media groups");
        self
          .deliver_media_groups(draft, &rich, &caption, contact.as_deref())
          .await
      }
      Err(e) => Err(e),
    }
  }

  // ── Archive path ──────────────────────────────────────────────────────────

  async fn deliver_archive(
    &self,
    draft: &Draft,
    infos: &[FileInfo],
    plain: &str,
    caption: &str,
    contact: Option<&str>,
  ) -> Result<()> {
    let mut files: Vec<(String, Bytes)> = Vec::with_capacity(infos.len());
    for (i, (att, info)) in draft.attachments.iter().zip(infos).enumerate() {
      let ext = match att.kind {
        AttachmentKind::Photo => ".jpg",
        AttachmentKind::Document => ".bin",
      };
      let bytes = self.transport.download(info).await?;
      files.push((format!("attachment_{}{ext}", i + 1), bytes));
    }

    let archive = build_archive(plain, &files)?;

    let link_button = contact.map(|url| LinkButton {
      label: ui::labels::CONTACT_DENTIST,
      url,
    });

    self
      .transport
      .send_document(self.target, OutgoingDocument {
        bytes: Bytes::from(archive),
        filename: ARCHIVE_FILENAME,
        caption,
        link_button,
      })
      .await?;
    Ok(())
  }

  // ── Grouped-media fallback ────────────────────────────────────────────────

  async fn deliver_media_groups(
    &self,
    draft: &Draft,
    rich: &str,
    caption: &str,
    contact: Option<&str>,
  ) -> Result<DeliveryOutcome> {
    // With nothing to group, the summary itself is the deliverable.
    if draft.attachments.is_empty() {
      let link_button = contact.map(|url| LinkButton {
        label: ui::labels::CONTACT_DENTIST,
        url,
      });
      self
        .transport
        .send_message(self.target, rich, SendOptions {
          rich: true,
          link_button,
          ..SendOptions::default()
        })
        .await?;
      return Ok(DeliveryOutcome::MediaGroups { batches: 0 });
    }

    let mut batches = 0;
    let mut first = true;
    for chunk in draft.attachments.chunks(MEDIA_GROUP_LIMIT) {
      let items: Vec<OutgoingMedia<'_>> = chunk
        .iter()
        .map(|att| {
          let slot_caption = if first {
            first = false;
            Some(caption)
          } else {
            None
          };
          OutgoingMedia {
            file_ref: &att.file_ref,
            kind: att.kind,
            caption: slot_caption,
          }
        })
        .collect();

      self.transport.send_media_group(self.target, &items).await?;
      batches += 1;
    }

    if let Some(url) = contact {
      self.send_contact_link(url).await?;
    }

    Ok(DeliveryOutcome::MediaGroups { batches })
  }

  /// Follow-up contact message: clickable button first, bare link if the
  /// button form is refused.
  async fn send_contact_link(&self, url: &str) -> Result<()> {
    let button = LinkButton { label: ui::labels::CONTACT_DENTIST, url };
    let with_button = SendOptions {
      link_button: Some(button),
      ..SendOptions::default()
    };

    if let Err(e) = self
      .transport
      .send_message(self.target, ui::CONTACT_PROMPT, with_button)
      .await
    {
      tracing::warn!(error = %e, "link button refused, sending plain link");
      let text = format!("{} {url}", ui::CONTACT_PROMPT);
      self
        .transport
        .send_message(self.target, &text, SendOptions::plain())
        .await?;
    }
    Ok(())
  }
}

/// Build the deflate archive: the summary file first, then the attachments
/// in their original order.
fn build_archive(plain: &str, files: &[(String, Bytes)]) -> Result<Vec<u8>> {
  let mut cursor = Cursor::new(Vec::new());
  {
    let mut writer = ZipWriter::new(&mut cursor);
    let options =
      SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(summary::SUMMARY_FILENAME, options)?;
    writer.write_all(plain.as_bytes())?;
    writer.write_all(b"\n")?;

    for (name, bytes) in files {
      writer.start_file(name.as_str(), options)?;
      writer.write_all(bytes)?;
    }

    writer.finish()?;
  }
  Ok(cursor.into_inner())
}
