use anyhow::bail;
use cliclack::{confirm, input, intro, log, outro, select};
use tracing::debug;

use super::repo::render_line;
use mirrorlist::{
    store::{ListStore, MutationError},
    sync::SyncClient,
    types::record::Field,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Edit,
    Remove,
    Add,
    Quit,
}

/// Interactive session: every change shows up at once and snaps back if the
/// server refuses it.
pub async fn run<C: SyncClient>(store: ListStore<C>) -> anyhow::Result<()> {
    intro("mirrorlist edit")?;

    loop {
        render(&store)?;

        let action = select("What next?")
            .item(Action::Edit, "Edit", "change a source or mirror")
            .item(Action::Remove, "Remove", "delete a repository")
            .item(Action::Add, "Add", "append an empty repository")
            .item(Action::Quit, "Quit", "")
            .interact()?;

        debug!(?action, "User picked");

        let result = match action {
            Action::Edit => {
                let Some(index) = pick(&store, "Which repository?")? else {
                    continue;
                };

                let mut fields = select("Which field?");
                for field in Field::ALL {
                    fields = fields.item(field, field.as_str(), "");
                }
                let field = fields.interact()?;

                let current = store.get(index).map(|r| r.get(field).to_string());
                let value: String = input(format!("New {field}"))
                    .default_input(current.as_deref().unwrap_or_default())
                    .required(false)
                    .interact()?;

                store.set_field(index, field, value).await
            }
            Action::Remove => {
                let Some(index) = pick(&store, "Remove which repository?")? else {
                    continue;
                };

                if !confirm(format!("Remove repository #{index}?")).interact()? {
                    continue;
                }

                store.remove_record(index).await
            }
            Action::Add => store.add_new_record().await,
            Action::Quit => break,
        };

        report(result.map(|confirmed| confirmed.mutation.to_string()))?;
    }

    outro("bye")?;

    Ok(())
}

fn render<C: SyncClient>(store: &ListStore<C>) -> anyhow::Result<()> {
    let snapshot = store.snapshot();

    if snapshot.records().is_empty() {
        log::remark("no repositories configured")?;
        return Ok(());
    }

    let lines: Vec<String> = snapshot
        .records()
        .iter()
        .enumerate()
        .map(|(index, record)| render_line(index, record))
        .collect();

    log::info(lines.join("\n"))?;

    Ok(())
}

fn pick<C: SyncClient>(store: &ListStore<C>, prompt: &str) -> anyhow::Result<Option<usize>> {
    let snapshot = store.snapshot();

    if snapshot.records().is_empty() {
        log::warning("the list is empty")?;
        return Ok(None);
    }

    let labels: Vec<String> = snapshot
        .records()
        .iter()
        .enumerate()
        .map(|(index, record)| render_line(index, record))
        .collect();

    let mut choice = select(prompt);
    for (index, label) in labels.iter().enumerate() {
        choice = choice.item(index, label, "");
    }

    Ok(Some(choice.interact()?))
}

/// Rollbacks are reported and the session carries on, anything else ends it.
fn report(result: Result<String, MutationError>) -> anyhow::Result<()> {
    match result {
        Ok(done) => log::success(done)?,
        Err(MutationError::RolledBack(rolled_back)) => {
            log::error(format!("{rolled_back}, change reverted"))?;
        }
        Err(err @ MutationError::IndexOutOfRange { .. }) => bail!(err),
    }

    Ok(())
}
