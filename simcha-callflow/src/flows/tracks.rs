//! Voucher track selection.

use super::{expect_key, menu_prompt, CallFlow, FlowContext, FlowSummary};
use crate::step::{EchoStyle, StepSpec};
use simcha_core::{
    CallResult, EntityKind, EntryKind, Flow, FlowError, InputError, LotteryEntry,
};
use simcha_gateway::VoiceGateway;
use simcha_storage::CelebrationStore;

/// Records which voucher track the caller wants her gifts fulfilled on.
pub struct TrackSelectionFlow;

impl<S: CelebrationStore, G: VoiceGateway> CallFlow<S, G> for TrackSelectionFlow {
    fn flow(&self) -> Flow {
        Flow::TrackSelection
    }

    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary> {
        let subject = cx
            .session
            .subject()
            .cloned()
            .ok_or_else(|| FlowError::IdentityRequired {
                flow: "tracks".to_string(),
            })?;

        let tracks = cx.store.lottery_tracks_all()?;
        if tracks.is_empty() {
            return Err(FlowError::EmptyCatalog {
                kind: EntityKind::LotteryTrack,
            }
            .into());
        }
        let options: Vec<(u8, String)> = tracks
            .iter()
            .map(|t| (t.menu_key, t.name.clone()))
            .collect();
        let keys: Vec<u8> = options.iter().map(|(k, _)| *k).collect();
        let prompt = menu_prompt(
            cx.menu.catalog(),
            "tracks.prompt_track",
            "tracks.option_track",
            "name",
            &options,
        )?;
        let step = StepSpec::menu("voucher_track", prompt, &keys).with_echo(EchoStyle::Label {
            message_key: "tracks.confirm_track".to_string(),
            labels: options,
        });
        let track_key = expect_key(cx.menu.ask(cx.session, &step)?, "voucher_track")?;
        let track = tracks
            .iter()
            .find(|t| t.menu_key == track_key)
            .cloned()
            .ok_or_else(|| InputError::OutOfGrammar {
                step: "voucher_track".to_string(),
            })?;

        let entry = LotteryEntry::new(subject.student_id, track.track_id, EntryKind::Voucher);
        cx.store.lottery_entry_insert(&entry)?;

        cx.menu
            .announce("tracks.saved", &[("name", track.name.clone())])?;

        Ok(FlowSummary {
            flow: Flow::TrackSelection,
            entity: Some(entry.entry_id),
            detail: format!("voucher track {}", track.name),
        })
    }
}
