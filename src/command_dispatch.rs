//! Purpose: Hold top-level CLI command dispatch for `pokedexer`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command opens one `Client` and drives view-models to a settled state.
//! Invariants: Helpers in `main.rs` own output envelopes and error hints.

use super::*;

pub(super) fn dispatch_command(command: Command, config: Config) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "pokedexer", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Catalog { command } => block_on(catalog_command(command, config)),
        Command::Party { command } => {
            block_on(party_command(command, config)).map_err(add_missing_party_hint)
        }
    }
}

async fn catalog_command(command: CatalogCommand, config: Config) -> Result<RunOutcome, Error> {
    let client = Client::open(&config).await?;
    match command {
        CatalogCommand::List { search } => {
            let entries = client
                .catalog()
                .entries()
                .try_next()
                .await?;
            let found = filter_by_name(&entries, search.as_deref().unwrap_or_default());
            emit_json(json!({ "pokemon": found }));
            Ok(RunOutcome::ok())
        }
        CatalogCommand::Import { file } => {
            let entries = read_catalog_file(&file)?;
            let imported = client.catalog().import(entries).await?;
            tracing::info!(entries = imported, path = %file.display(), "imported catalog entries");
            emit_json(json!({ "imported": imported }));
            Ok(RunOutcome::ok())
        }
    }
}

async fn party_command(command: PartyCommand, config: Config) -> Result<RunOutcome, Error> {
    let client = Client::open(&config).await?;
    match command {
        PartyCommand::Create { name, pokemon } => {
            let editor = client.create_party_view(None).await?;
            fill_draft(&client, &editor, &name, &pokemon_ids(&pokemon)).await?;
            let id = match save_draft(&editor).await? {
                SaveOutcome::Created(id) | SaveOutcome::Updated(id) => id,
                SaveOutcome::Incomplete => return Err(incomplete_draft(&name)),
            };
            emit_settled_party(&client, id).await
        }
        PartyCommand::Update {
            party_id,
            name,
            pokemon,
        } => {
            let editor = client.create_party_view(Some(PartyId(party_id))).await?;
            for selected in editor.draft().selected {
                editor.remove_pokemon(&selected);
            }
            fill_draft(&client, &editor, &name, &pokemon_ids(&pokemon)).await?;
            let id = match save_draft(&editor).await? {
                SaveOutcome::Created(id) | SaveOutcome::Updated(id) => id,
                SaveOutcome::Incomplete => return Err(incomplete_draft(&name)),
            };
            emit_settled_party(&client, id).await
        }
        PartyCommand::Delete { party_id } => {
            let id = PartyId(party_id);
            let view = client.party_details_view(id);
            let party = match settle_details(view.subscribe()).await? {
                PartyDetailsUiState::Ready { party, .. } => party,
                _ => return Err(party_not_found(id)),
            };
            if !view.delete_party().await? {
                return Err(party_not_found(id));
            }
            emit_json(json!({ "deleted": party }));
            Ok(RunOutcome::ok())
        }
        PartyCommand::List => {
            let view = client.parties_view();
            let mut state = view.subscribe();
            let ready = state
                .wait_for(|state| matches!(state, PartiesUiState::Ready(_)))
                .await
                .map_err(|_| live_query_stopped())?
                .clone();
            if let Some(value) = parties_state_json(&ready) {
                emit_json(value);
            }
            Ok(RunOutcome::ok())
        }
        PartyCommand::Show { party_id } => emit_settled_party(&client, PartyId(party_id)).await,
        PartyCommand::Watch { party_id } => watch(&client, party_id.map(PartyId)).await,
    }
}

/// Copy `name` and `ids` into the draft, rejecting ids the draft would drop.
async fn fill_draft(
    client: &Client,
    editor: &CreatePartyViewModel,
    name: &str,
    ids: &[PokemonId],
) -> Result<(), Error> {
    editor.update_name(name);
    let entries = client
        .catalog()
        .entries_by_ids(ids)
        .try_next()
        .await?;
    for id in ids {
        let Some(entry) = entries.iter().find(|entry| entry.id == *id) else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown pokemon id {}", id.0))
                .with_hint("Run `pokedexer catalog list` to see valid ids."));
        };
        if editor.draft().contains(*id) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("pokemon {} is listed more than once", id.0)));
        }
        if !editor.add_pokemon(entry) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("a party holds at most {MAX_PARTY_SIZE} pokemon")));
        }
    }
    Ok(())
}

async fn save_draft(editor: &CreatePartyViewModel) -> Result<SaveOutcome, Error> {
    let outcome = editor.save_party().await?;
    tracing::debug!(?outcome, "party saved");
    Ok(outcome)
}

fn incomplete_draft(name: &str) -> Error {
    let message = if name.trim().is_empty() {
        "party name must not be blank"
    } else {
        "a party needs at least one pokemon"
    };
    Error::new(ErrorKind::Usage).with_message(message)
}

async fn settle_details(
    mut state: tokio::sync::watch::Receiver<PartyDetailsUiState>,
) -> Result<PartyDetailsUiState, Error> {
    let settled = state
        .wait_for(|state| !matches!(state, PartyDetailsUiState::Loading))
        .await
        .map_err(|_| live_query_stopped())?
        .clone();
    Ok(settled)
}

async fn emit_settled_party(client: &Client, party_id: PartyId) -> Result<RunOutcome, Error> {
    let view = client.party_details_view(party_id);
    let settled = settle_details(view.subscribe()).await?;
    if !matches!(settled, PartyDetailsUiState::Ready { .. }) {
        return Err(party_not_found(party_id));
    }
    if let Some(value) = details_state_json(party_id, &settled) {
        emit_json(value);
    }
    Ok(RunOutcome::ok())
}

/// Stream the list (or one party) as JSON lines until Ctrl-C.
async fn watch(client: &Client, party_id: Option<PartyId>) -> Result<RunOutcome, Error> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    match party_id {
        Some(id) => {
            let view = client.party_details_view(id);
            let mut state = view.subscribe();
            loop {
                let line = details_state_json(id, &state.borrow_and_update());
                if let Some(line) = line {
                    emit_json_line(&line);
                }
                tokio::select! {
                    changed = state.changed() => if changed.is_err() { break },
                    _ = &mut shutdown => break,
                }
            }
        }
        None => {
            let view = client.parties_view();
            let mut state = view.subscribe();
            loop {
                let line = parties_state_json(&state.borrow_and_update());
                if let Some(line) = line {
                    emit_json_line(&line);
                }
                tokio::select! {
                    changed = state.changed() => if changed.is_err() { break },
                    _ = &mut shutdown => break,
                }
            }
        }
    }
    Ok(RunOutcome::ok())
}
