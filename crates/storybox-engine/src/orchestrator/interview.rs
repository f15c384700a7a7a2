//! Push-to-talk guest interviews during the editing stage.
//!
//! Holding the control starts capture and silences the agent; releasing it
//! runs one interview turn: the recognized question is answered by simulated
//! guests, each utterance is voiced in order with its expression shown while
//! it plays, and the agent receives a one-sentence summary afterwards.
//! Starting a new capture aborts a turn still in flight.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use storybox_core::{Stage, StoryboxError, StorySession, decode_with_fallback};

use super::Inner;
use crate::prompts;
use crate::voices::CHARACTER_FALLBACK_VOICE;

#[derive(Debug, Default, Deserialize)]
struct InterviewReply {
    #[serde(default)]
    utterances: Vec<GuestUtterance>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct GuestUtterance {
    name: String,
    utterance: String,
    expression: String,
}

pub(super) async fn begin(inner: &Arc<Inner>, guest_name: &str) -> Result<(), StoryboxError> {
    if inner.store.snapshot().stage != Stage::Editing {
        debug!(guest_name, "interview ignored outside the editing stage");
        return Ok(());
    }
    let _ = inner.abort_interview_turn();
    *inner.interview_target.lock() = Some(guest_name.to_owned());

    inner.recognizer.start().await?;
    inner.channel.mute_microphone().await;
    inner.channel.interrupt().await?;
    Ok(())
}

pub(super) async fn finish(inner: &Arc<Inner>) -> Result<(), StoryboxError> {
    let Some(target) = inner.interview_target.lock().take() else {
        return Ok(());
    };
    let transcript = inner.recognizer.stop().await?;
    inner.channel.unmute_microphone().await;
    if transcript.trim().is_empty() {
        return Ok(());
    }

    let epoch = inner.current_epoch();
    let cancel = inner.abort_interview_turn();
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = run_turn(inner, epoch, target, transcript) => {}
        }
    });
    Ok(())
}

async fn run_turn(inner: Arc<Inner>, epoch: u64, target: String, transcript: String) {
    let session = inner.store.snapshot();
    let latest_caption = session
        .scenes
        .last()
        .map(|scene| scene.caption.clone())
        .unwrap_or_default();
    let history = inner.history.lock().join("\n");

    let messages = prompts::guest_interview(
        &session.guests,
        &history,
        &latest_caption,
        &target,
        &transcript,
    );
    let reply = match inner.text.complete_json(&messages).await {
        Ok(json) => {
            decode_with_fallback::<InterviewReply>(&json, InterviewReply::default()).into_value()
        }
        Err(err) => {
            warn!(error = %err, "interview turn failed");
            return;
        }
    };

    for line in &reply.utterances {
        let voice = inner
            .guest_seeds
            .iter()
            .find(|seed| seed.name == line.name)
            .map_or(CHARACTER_FALLBACK_VOICE, |seed| seed.voice_id.as_str())
            .to_owned();

        let _ = inner.guarded_update(epoch, |session| {
            set_expression(session, &line.name, &line.expression);
        });
        let done = inner.voices.enqueue(&line.utterance, &voice);
        let _ = done.await;
        let _ = inner.guarded_update(epoch, |session| {
            set_expression(session, &line.name, "smile");
        });
        inner
            .history
            .lock()
            .push(format!("{}: {}", line.name, line.utterance));
    }
    inner.history.lock().push(format!("User: {transcript}"));

    if !reply.summary.is_empty() {
        let message = format!(
            "I just had a round of discussion with the guests. Here is the summary: {}",
            reply.summary
        );
        if let Err(err) = inner.channel.send_user_message(&message).await {
            warn!(error = %err, "failed to relay interview summary");
        }
    }
}

fn set_expression(session: &mut StorySession, guest_name: &str, expression: &str) {
    if let Some(guest) = session.guests.iter_mut().find(|g| g.name == guest_name) {
        guest.expression = expression.to_owned();
    }
}
