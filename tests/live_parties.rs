// Library-level flows across the three view-models sharing one database.
use pokedexer::api::{
    Catalog, Client, Config, PartiesUiState, PartyDetailsUiState, PokemonId, SaveOutcome,
};

async fn open(dir: &std::path::Path) -> Client {
    Client::open(&Config::with_data_dir(dir)).await.expect("open client")
}

#[tokio::test]
async fn views_follow_create_edit_and_delete() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = open(temp.path()).await;

    let list = client.parties_view();
    let mut list_state = list.subscribe();
    list_state
        .wait_for(|state| matches!(state, PartiesUiState::Ready(parties) if parties.is_empty()))
        .await
        .expect("empty list");

    let editor = client.create_party_view(None).await.expect("editor");
    editor.update_name("Electric");
    editor.update_search_text("pika");
    let pikachu = editor
        .subscribe_pokemon_list()
        .wait_for(|list| list.len() == 1)
        .await
        .expect("search")[0]
        .clone();
    assert_eq!(pikachu.id, PokemonId(25));
    assert!(editor.add_pokemon(&pikachu));
    let SaveOutcome::Created(id) = editor.save_party().await.expect("save") else {
        panic!("expected created");
    };
    editor.reset_if_new();
    assert!(editor.draft().selected.is_empty());

    list_state
        .wait_for(|state| matches!(state, PartiesUiState::Ready(parties) if parties.len() == 1))
        .await
        .expect("list shows party");

    let details = client.party_details_view(id);
    let mut details_state = details.subscribe();
    details_state
        .wait_for(|state| matches!(state, PartyDetailsUiState::Ready { pokemon, .. } if pokemon.len() == 1))
        .await
        .expect("details ready");

    let edit = client.create_party_view(Some(id)).await.expect("edit");
    assert_eq!(edit.draft().name, "Electric");
    let raichu = client
        .catalog()
        .entries_by_ids(&[PokemonId(26)])
        .next()
        .await
        .expect("catalog")[0]
        .clone();
    assert!(edit.add_pokemon(&raichu));
    assert_eq!(edit.save_party().await.expect("update"), SaveOutcome::Updated(id));

    let names = details_state
        .wait_for(|state| matches!(state, PartyDetailsUiState::Ready { pokemon, .. } if pokemon.len() == 2))
        .await
        .expect("details updated")
        .clone();
    let PartyDetailsUiState::Ready { pokemon, .. } = names else {
        panic!("expected ready");
    };
    let names: Vec<_> = pokemon.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Pikachu", "Raichu"]);

    let PartiesUiState::Ready(parties) = list.state() else {
        panic!("expected ready list");
    };
    list.delete_party(&parties[0].party).await.expect("delete");
    details_state
        .wait_for(|state| *state == PartyDetailsUiState::Error)
        .await
        .expect("details error");
    list_state
        .wait_for(|state| matches!(state, PartiesUiState::Ready(parties) if parties.is_empty()))
        .await
        .expect("list empty");
}
