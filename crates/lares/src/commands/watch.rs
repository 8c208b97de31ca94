//! `lares watch`: print every stream update until Ctrl-C.
//!
//! The session reconnects on its own after the first successful connect;
//! state changes are reported on stderr.

use std::collections::HashSet;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::info;

use lares_core::{Panel, PanelConfig, SessionState, StreamKind, StreamUpdate};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::connect;

fn selected_streams(names: &[String]) -> Result<HashSet<StreamKind>, CliError> {
    if names.is_empty() {
        return Ok(StreamKind::iter().collect());
    }
    names
        .iter()
        .map(|name| {
            StreamKind::from_str(name.trim()).map_err(|_| CliError::Validation {
                field: "stream".into(),
                reason: format!(
                    "unknown stream '{name}', expected one of: {}",
                    StreamKind::iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
                ),
            })
        })
        .collect()
}

/// Outputs fan out to several kinds; print each update once, from the
/// first selected kind it belongs to.
fn owner(update: &StreamUpdate, selected: &HashSet<StreamKind>) -> Option<StreamKind> {
    update.kinds().iter().copied().find(|k| selected.contains(k))
}

pub async fn handle(config: PanelConfig, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let selected = Arc::new(selected_streams(&args.streams)?);
    let color = output::should_color(global.color);

    let mut builder = Panel::builder(config).set_on_reconnect(|static_config, _realtime, version| {
        let model = version
            .as_ref()
            .and_then(|v| v.get("MODEL"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_owned();
        info!(outputs = static_config.outputs.len(), zones = static_config.zones.len(), %model, "panel session ready");
        Ok(())
    });
    for &kind in selected.iter() {
        let selected = Arc::clone(&selected);
        builder = builder.register_listener(kind, move |update| {
            if update.is_empty() || owner(update, &selected) != Some(kind) {
                return Ok(());
            }
            let line = output::stream_line(update, color)?;
            writeln!(std::io::stdout().lock(), "{line}")?;
            Ok(())
        });
    }

    let panel = connect(builder).await?;
    let mut state = panel.subscribe_state();
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *state.borrow_and_update();
                if !global.quiet && now != SessionState::Running {
                    eprintln!("session {now}");
                }
            }
        }
    }

    info!("shutting down");
    panel.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn outputs_print_once_from_the_first_selected_kind() {
        let update = StreamUpdate::Outputs(Vec::new());
        let all: HashSet<StreamKind> = StreamKind::iter().collect();
        assert_eq!(owner(&update, &all), Some(StreamKind::Lights));

        let covers = selected_streams(&["covers".into()]).unwrap();
        assert_eq!(owner(&update, &covers), Some(StreamKind::Covers));
    }

    #[test]
    fn unknown_stream_is_rejected() {
        assert!(matches!(
            selected_streams(&["doors".into()]),
            Err(CliError::Validation { .. })
        ));
    }
}
