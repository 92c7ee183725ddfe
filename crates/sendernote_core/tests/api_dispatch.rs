use serde_json::{json, Value};
use sendernote_core::{
    dispatch, dispatch_json, ApiError, NotesRepository, Request, Response, SqliteAdapter,
};

fn repo() -> NotesRepository<SqliteAdapter> {
    NotesRepository::new(SqliteAdapter::in_memory())
        .with_default_templates(|| vec!["VIP".to_string(), "Spam".to_string()])
}

fn call(repo: &NotesRepository<SqliteAdapter>, request: Value) -> Value {
    let raw = dispatch_json(repo, &request.to_string()).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn save_and_lookup_round_trip_through_json() {
    let repo = repo();

    let saved = call(
        &repo,
        json!({
            "action": "saveNote",
            "pattern": "Boss@Corp.com",
            "matchType": "exact",
            "note": "VIP"
        }),
    );
    assert_eq!(saved, json!({"success": true, "noteId": 1}));

    let found = call(
        &repo,
        json!({"action": "findNoteByEmail", "email": "boss@corp.com"}),
    );
    assert_eq!(found["id"], json!(1));
    assert_eq!(found["pattern"], json!("boss@corp.com"));
    assert_eq!(found["matchType"], json!("exact"));
    assert_eq!(found["originalEmail"], json!("boss@corp.com"));

    let missing = call(
        &repo,
        json!({"action": "findNoteByEmail", "email": "nobody@corp.com"}),
    );
    assert_eq!(missing, Value::Null);
}

#[test]
fn duplicate_save_is_a_structured_response() {
    let repo = repo();
    let request = json!({
        "action": "saveNote",
        "pattern": "boss@corp.com",
        "matchType": "exact",
        "note": "VIP"
    });
    call(&repo, request.clone());

    let duplicate = call(&repo, request);
    assert_eq!(
        duplicate,
        json!({
            "success": false,
            "error": "duplicate",
            "message": "A note with this exact pattern and match type already exists.",
            "existingNoteId": 1
        })
    );
}

#[test]
fn author_header_resolves_sender() {
    let repo = repo();
    call(
        &repo,
        json!({
            "action": "saveNote",
            "pattern": "@corp.com",
            "matchType": "endsWith",
            "note": "Corp"
        }),
    );

    let email = call(
        &repo,
        json!({"action": "extractEmail", "author": "Jane Doe <Jane@Corp.com>"}),
    );
    assert_eq!(email, json!("jane@corp.com"));

    let found = call(
        &repo,
        json!({"action": "findNoteByAuthor", "author": "Jane Doe <Jane@Corp.com>"}),
    );
    assert_eq!(found["note"], json!("Corp"));
}

#[test]
fn all_notes_are_keyed_by_id() {
    let repo = repo();
    call(
        &repo,
        json!({"action": "saveNote", "pattern": "a@x.com", "matchType": "exact", "note": "a"}),
    );

    let all = call(&repo, json!({"action": "getAllNotes"}));
    assert_eq!(all["1"]["note"], json!("a"));
}

#[test]
fn check_duplicate_and_validate_pattern() {
    let repo = repo();
    call(
        &repo,
        json!({"action": "saveNote", "pattern": "a@x.com", "matchType": "exact", "note": "a"}),
    );

    let check = call(
        &repo,
        json!({"action": "checkDuplicate", "pattern": "A@X.com", "matchType": "exact"}),
    );
    assert_eq!(check["exists"], json!(true));
    assert_eq!(check["noteId"], json!(1));

    let clear = call(
        &repo,
        json!({"action": "checkDuplicate", "pattern": "a@x.com", "matchType": "exact", "excludeId": 1}),
    );
    assert_eq!(clear, json!({"exists": false}));

    let valid = call(
        &repo,
        json!({"action": "validatePattern", "email": "a@x.com", "pattern": "@x.com", "matchType": "endsWith"}),
    );
    assert_eq!(valid, json!(true));
}

#[test]
fn templates_flow_through_default_keys() {
    let repo = repo();

    let defaults = call(&repo, json!({"action": "getTemplates"}));
    assert_eq!(
        defaults,
        json!([
            {"id": null, "text": "VIP", "order": 0, "isDefault": true},
            {"id": null, "text": "Spam", "order": 1, "isDefault": true}
        ])
    );

    let updated = call(
        &repo,
        json!({"action": "updateTemplate", "key": {"defaultIndex": 0}, "text": "Very important"}),
    );
    assert_eq!(updated["success"], json!(true));
    assert_eq!(updated["template"]["text"], json!("Very important"));
    let spam_id = call(&repo, json!({"action": "getTemplates"}))[1]["id"].clone();

    let moved = call(
        &repo,
        json!({"action": "moveTemplate", "key": {"id": spam_id}}),
    );
    assert_eq!(moved, json!({"success": true}));

    let texts: Vec<Value> = call(&repo, json!({"action": "getTemplates"}))
        .as_array()
        .unwrap()
        .iter()
        .map(|template| template["text"].clone())
        .collect();
    assert_eq!(texts, vec![json!("Spam"), json!("Very important")]);
}

#[test]
fn settings_values_and_defaults() {
    let repo = repo();

    let fallback = call(
        &repo,
        json!({"action": "getSetting", "key": "theme", "defaultValue": "light"}),
    );
    assert_eq!(fallback, json!("light"));

    call(
        &repo,
        json!({"action": "setSetting", "key": "theme", "value": "dark"}),
    );
    let all = call(&repo, json!({"action": "getSettings"}));
    assert_eq!(all, json!({"theme": "dark"}));
}

#[test]
fn import_reports_counts() {
    let repo = repo();
    let note = json!({
        "id": 10,
        "pattern": "a@x.com",
        "matchType": "exact",
        "note": "a",
        "createdAt": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:00:00.000Z"
    });

    let summary = call(
        &repo,
        json!({"action": "importNotes", "notes": [note.clone(), note]}),
    );
    assert_eq!(
        summary,
        json!({"success": true, "imported": 1, "skippedDuplicates": 1})
    );
}

#[test]
fn typed_dispatch_returns_typed_responses() {
    let repo = repo();
    let response = dispatch(&repo, Request::GetNoteById { id: 99 }).unwrap();
    assert_eq!(response, Response::Note(None));

    let response = dispatch(&repo, Request::ClearAll).unwrap();
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({"success": true})
    );
}

#[test]
fn unknown_action_is_an_invalid_request() {
    let repo = repo();
    let err = dispatch_json(&repo, r#"{"action": "launchRockets"}"#).unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let err = dispatch_json(&repo, "not json").unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}
