//! Discovery side effects: desktop notification and sound.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use wayfind_core::{EffectDispatcher, EffectError, EffectSink};

use crate::config::EffectsConfig;

/// Notification title for a new discovery.
pub const NOTIFICATION_TITLE: &str = "New Discovery!";

/// Notification body for a new discovery.
pub fn notification_body(place_name: &str) -> String {
    format!("You discovered {}!", place_name)
}

/// Desktop notification per discovery.
///
/// With the `notifications` feature this shows a native notification;
/// without it the notification is written to the log.
#[derive(Debug, Default)]
pub struct NotificationSink;

impl NotificationSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EffectSink for NotificationSink {
    fn name(&self) -> &str {
        "notification"
    }

    #[cfg(feature = "notifications")]
    async fn on_discovery(&self, place_name: &str) -> Result<(), EffectError> {
        let body = notification_body(place_name);
        // notify-rust talks to the session bus synchronously.
        let shown = tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(NOTIFICATION_TITLE)
                .body(&body)
                .appname("wayfind")
                .show()
                .map(|_| ())
        })
        .await
        .map_err(|e| EffectError::Unavailable(e.to_string()))?;

        shown.map_err(|e| EffectError::Unavailable(e.to_string()))?;
        debug!("Notification shown for {}", place_name);
        Ok(())
    }

    #[cfg(not(feature = "notifications"))]
    async fn on_discovery(&self, place_name: &str) -> Result<(), EffectError> {
        tracing::info!("{} {}", NOTIFICATION_TITLE, notification_body(place_name));
        Ok(())
    }
}

/// Plays a custom sound file per discovery through an external player.
///
/// The player is started and left running; the sink does not wait for
/// playback to finish.
#[derive(Debug, Clone)]
pub struct SoundSink {
    sound_path: Option<PathBuf>,
    player: String,
}

impl SoundSink {
    pub fn new(sound_path: Option<PathBuf>, player: impl Into<String>) -> Self {
        Self {
            sound_path,
            player: player.into(),
        }
    }
}

#[async_trait]
impl EffectSink for SoundSink {
    fn name(&self) -> &str {
        "sound"
    }

    async fn on_discovery(&self, place_name: &str) -> Result<(), EffectError> {
        let Some(path) = &self.sound_path else {
            debug!("No custom discovery sound configured");
            return Ok(());
        };

        if !tokio::fs::try_exists(path).await? {
            return Err(EffectError::Unavailable(format!(
                "sound file {} not found",
                path.display()
            )));
        }

        let child = tokio::process::Command::new(&self.player)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EffectError::Unavailable(format!("sound player '{}' not found", self.player))
                }
                std::io::ErrorKind::PermissionDenied => {
                    EffectError::PermissionDenied(format!("cannot run '{}'", self.player))
                }
                _ => EffectError::Io(e),
            })?;

        debug!(
            "Playing {} for {} (pid {:?})",
            path.display(),
            place_name,
            child.id()
        );
        Ok(())
    }
}

/// Build the effect dispatcher described by the `[effects]` section.
pub fn build_effects(config: &EffectsConfig) -> EffectDispatcher {
    let mut effects = EffectDispatcher::new();
    if config.notifications {
        effects = effects.with_sink(std::sync::Arc::new(NotificationSink::new()));
    }
    if config.sound_path.is_some() {
        effects = effects.with_sink(std::sync::Arc::new(SoundSink::new(
            config.sound_path.clone(),
            config.sound_player.clone(),
        )));
    }
    effects
}
