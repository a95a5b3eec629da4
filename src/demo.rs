use uuid::Uuid;

use cama_core::{CheckpointPatch, CoreError, MeterSource, NewCheckpoint, PassageType};

use crate::state::App;

/// What a demo run recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub checkpoint_id: Uuid,
    pub session_id: Uuid,
    /// Queue sequences of the recorded changes, in order.
    pub sequences: Vec<u64>,
}

/// Walk through a short field session against `app`: add, rename and
/// remove a checkpoint at A1, then sample gas there and upload the session.
///
/// Every step only touches the local store and queue, so it runs the same
/// whether or not the sync loop is reaching its sink.
pub fn record_demo<M>(app: &App, meter: &M) -> Result<DemoReport, CoreError>
where
    M: MeterSource + ?Sized,
{
    let mut sequences = Vec::new();

    let created = app.checkpoints.create(
        NewCheckpoint::new("Lower crawl at A1", PassageType::Crawl, "A1")
            .with_depth(5.0)
            .with_distance(2.0),
    )?;
    let checkpoint_id = created.value.id;
    sequences.push(created.event.sequence);
    tracing::info!(%checkpoint_id, "demo: checkpoint created");

    let edited = app
        .checkpoints
        .edit(checkpoint_id, &CheckpointPatch::new().name("Lower crawl near A1"))?;
    sequences.push(edited.event.sequence);
    tracing::info!(name = %edited.value.name, "demo: checkpoint renamed");

    let deleted = app.checkpoints.delete(checkpoint_id)?;
    sequences.push(deleted.event.sequence);
    tracing::info!(%checkpoint_id, "demo: checkpoint deleted");

    let mut session = app.sessions.start("A1")?;
    for _ in 0..3 {
        app.sessions.record(&mut session, meter)?;
    }
    app.sessions.end(&mut session)?;
    let uploaded = app.sessions.upload(&session)?;
    sequences.push(uploaded.event.sequence);
    tracing::info!(
        session_id = %session.id(),
        readings = uploaded.value.reading_count,
        "demo: sampling session uploaded"
    );

    Ok(DemoReport {
        checkpoint_id,
        session_id: session.id(),
        sequences,
    })
}
