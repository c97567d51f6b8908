use anyhow::Context;
use tracing::{debug, info};

use mirrorlist::{
    store::ListStore,
    sync::SyncClient,
    types::record::{Field, RepositoryRecord},
};

/// One line per record, as shown by `list` and the editor.
pub fn render_line(index: usize, record: &RepositoryRecord) -> String {
    let name = record.display_name();
    let name = if name.is_empty() { "(unnamed)" } else { name };

    format!("#{index} {name}: {record}")
}

pub fn list<C: SyncClient>(store: &ListStore<C>) -> anyhow::Result<()> {
    let snapshot = store.snapshot();

    if snapshot.records().is_empty() {
        info!("no repositories configured");
        return Ok(());
    }

    for (index, record) in snapshot.records().iter().enumerate() {
        println!("{}", render_line(index, record));
    }

    Ok(())
}

pub async fn set<C: SyncClient>(
    store: &ListStore<C>,
    index: usize,
    field: Field,
    value: String,
) -> anyhow::Result<()> {
    debug!("setting {field} of #{index}");

    store
        .set_field(index, field, value)
        .await
        .with_context(|| format!("updating {field} of repository #{index}"))?;

    info!("Updated {field} of repository #{index}");

    Ok(())
}

pub async fn remove<C: SyncClient>(store: &ListStore<C>, index: usize) -> anyhow::Result<()> {
    let record = store
        .get(index)
        .with_context(|| format!("repository #{index} not found"))?;

    store.remove_record(index).await?;

    info!("deleted repository {}", render_line(index, &record));

    Ok(())
}

pub async fn add<C: SyncClient>(store: &ListStore<C>) -> anyhow::Result<()> {
    store.add_new_record().await?;

    info!(
        "Added an empty repository as #{}, fill it in with `set`",
        store.len() - 1
    );

    Ok(())
}
