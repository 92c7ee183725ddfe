//! Request/response contract consumed by UI surfaces.
//!
//! # Responsibility
//! - Model every supported call as one variant of a closed request type.
//! - Route each variant to exactly one repository operation.
//!
//! # Invariants
//! - One request yields one response; there is no streaming.
//! - Duplicate rejection is the only failure encoded inside a successful
//!   response. Storage faults surface as `ApiError::Store`.
//!
//! Wire format is JSON: `{"action": "<camelCaseName>", ...camelCaseFields}`.

use crate::matching::extract_email;
use crate::model::note::{MatchType, Note, NoteId, SaveNoteInput};
use crate::model::settings::Settings;
use crate::model::template::{Template, TemplateId, TemplateKey};
use crate::repository::{
    DuplicateCheck, ImportSummary, NotesRepository, SaveOutcome, DUPLICATE_MESSAGE,
};
use crate::store::{StorageAdapter, StoreError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error returned by [`dispatch`] and [`dispatch_json`].
#[derive(Debug)]
pub enum ApiError {
    /// Request JSON could not be decoded into a [`Request`].
    InvalidRequest(serde_json::Error),
    /// Response could not be encoded.
    Encode(serde_json::Error),
    Store(StoreError),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(err) => write!(f, "invalid request: {err}"),
            Self::Encode(err) => write!(f, "failed to encode response: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRequest(err) | Self::Encode(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Every call a UI surface can make.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    SaveNote(SaveNoteInput),
    GetNoteById {
        id: NoteId,
    },
    FindNoteByEmail {
        email: String,
    },
    FindNotesByEmail {
        email: String,
    },
    /// Resolves the sender of an author header such as `Name <addr>`.
    FindNoteByAuthor {
        author: String,
    },
    #[serde(rename_all = "camelCase")]
    CheckDuplicate {
        pattern: String,
        match_type: MatchType,
        #[serde(default)]
        exclude_id: Option<NoteId>,
    },
    DeleteNote {
        id: NoteId,
    },
    DeleteNoteByEmail {
        email: String,
    },
    GetAllNotes,
    ImportNotes {
        notes: Vec<Note>,
    },
    ClearAll,
    #[serde(rename_all = "camelCase")]
    ValidatePattern {
        email: String,
        pattern: String,
        match_type: MatchType,
    },
    ExtractEmail {
        author: String,
    },
    GetTemplates,
    GetTemplateById {
        id: TemplateId,
    },
    AddTemplate {
        text: String,
    },
    UpdateTemplate {
        key: TemplateKey,
        text: String,
    },
    DeleteTemplate {
        key: TemplateKey,
    },
    MoveTemplate {
        key: TemplateKey,
        #[serde(default)]
        after: Option<TemplateKey>,
    },
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
    #[serde(rename_all = "camelCase")]
    GetSetting {
        key: String,
        #[serde(default)]
        default_value: Value,
    },
    SetSetting {
        key: String,
        value: Value,
    },
}

impl Request {
    /// Wire name of the request, for diagnostics.
    pub fn action(&self) -> &'static str {
        match self {
            Self::SaveNote(_) => "saveNote",
            Self::GetNoteById { .. } => "getNoteById",
            Self::FindNoteByEmail { .. } => "findNoteByEmail",
            Self::FindNotesByEmail { .. } => "findNotesByEmail",
            Self::FindNoteByAuthor { .. } => "findNoteByAuthor",
            Self::CheckDuplicate { .. } => "checkDuplicate",
            Self::DeleteNote { .. } => "deleteNote",
            Self::DeleteNoteByEmail { .. } => "deleteNoteByEmail",
            Self::GetAllNotes => "getAllNotes",
            Self::ImportNotes { .. } => "importNotes",
            Self::ClearAll => "clearAll",
            Self::ValidatePattern { .. } => "validatePattern",
            Self::ExtractEmail { .. } => "extractEmail",
            Self::GetTemplates => "getTemplates",
            Self::GetTemplateById { .. } => "getTemplateById",
            Self::AddTemplate { .. } => "addTemplate",
            Self::UpdateTemplate { .. } => "updateTemplate",
            Self::DeleteTemplate { .. } => "deleteTemplate",
            Self::MoveTemplate { .. } => "moveTemplate",
            Self::GetSettings => "getSettings",
            Self::SaveSettings { .. } => "saveSettings",
            Self::GetSetting { .. } => "getSetting",
            Self::SetSetting { .. } => "setSetting",
        }
    }
}

/// Plain acknowledgement: `{"success": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub const OK: Ack = Ack { success: true };
}

/// `{success, noteId}` or `{success: false, error: "duplicate", message, existingNoteId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveNoteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_note_id: Option<NoteId>,
}

impl From<SaveOutcome> for SaveNoteResponse {
    fn from(value: SaveOutcome) -> Self {
        match value {
            SaveOutcome::Saved { note_id } => Self {
                success: true,
                note_id: Some(note_id),
                error: None,
                message: None,
                existing_note_id: None,
            },
            SaveOutcome::Duplicate { existing_note_id } => Self {
                success: false,
                note_id: None,
                error: Some("duplicate"),
                message: Some(DUPLICATE_MESSAGE),
                existing_note_id: Some(existing_note_id),
            },
        }
    }
}

/// `{success, template}` for template mutations that return a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateResponse {
    pub success: bool,
    pub template: Option<Template>,
}

/// `{success, imported, skippedDuplicates}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

/// Response payload; serialized without an enclosing tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ack(Ack),
    SaveNote(SaveNoteResponse),
    Note(Option<Note>),
    Notes(Vec<Note>),
    NoteMap(BTreeMap<NoteId, Note>),
    Duplicate(DuplicateCheck),
    Import(ImportResponse),
    Matches(bool),
    Email(String),
    Templates(Vec<Template>),
    Template(Option<Template>),
    TemplateMutation(TemplateResponse),
    Settings(Settings),
    Value(Value),
}

/// Routes one request to its repository operation.
pub fn dispatch<A: StorageAdapter>(
    repo: &NotesRepository<A>,
    request: Request,
) -> Result<Response, ApiError> {
    let action = request.action();
    let response = match request {
        Request::SaveNote(input) => Response::SaveNote(repo.save_note(input)?.into()),
        Request::GetNoteById { id } => Response::Note(repo.get_note_by_id(id)?),
        Request::FindNoteByEmail { email } => Response::Note(repo.find_note_by_email(&email)?),
        Request::FindNotesByEmail { email } => Response::Notes(repo.find_notes_by_email(&email)?),
        Request::FindNoteByAuthor { author } => {
            Response::Note(repo.find_note_by_email(&extract_email(&author))?)
        }
        Request::CheckDuplicate {
            pattern,
            match_type,
            exclude_id,
        } => Response::Duplicate(repo.check_duplicate(&pattern, match_type, exclude_id)?),
        Request::DeleteNote { id } => {
            repo.delete_note(id)?;
            Response::Ack(Ack::OK)
        }
        Request::DeleteNoteByEmail { email } => {
            repo.delete_note_by_email(&email)?;
            Response::Ack(Ack::OK)
        }
        Request::GetAllNotes => Response::NoteMap(repo.get_all_notes()?),
        Request::ImportNotes { notes } => Response::Import(ImportResponse {
            success: true,
            summary: repo.import_notes(notes)?,
        }),
        Request::ClearAll => {
            repo.clear_all()?;
            Response::Ack(Ack::OK)
        }
        Request::ValidatePattern {
            email,
            pattern,
            match_type,
        } => Response::Matches(repo.validate_pattern(&email, &pattern, match_type)),
        Request::ExtractEmail { author } => Response::Email(extract_email(&author)),
        Request::GetTemplates => Response::Templates(repo.get_templates()?),
        Request::GetTemplateById { id } => Response::Template(repo.get_template_by_id(id)?),
        Request::AddTemplate { text } => Response::TemplateMutation(TemplateResponse {
            success: true,
            template: Some(repo.add_template(&text)?),
        }),
        Request::UpdateTemplate { key, text } => Response::TemplateMutation(TemplateResponse {
            success: true,
            template: repo.update_template(key, &text)?,
        }),
        Request::DeleteTemplate { key } => {
            repo.delete_template(key)?;
            Response::Ack(Ack::OK)
        }
        Request::MoveTemplate { key, after } => {
            repo.move_template(key, after)?;
            Response::Ack(Ack::OK)
        }
        Request::GetSettings => Response::Settings(repo.get_settings()?),
        Request::SaveSettings { settings } => {
            repo.save_settings(&settings)?;
            Response::Ack(Ack::OK)
        }
        Request::GetSetting { key, default_value } => {
            Response::Value(repo.get_setting(&key, default_value)?)
        }
        Request::SetSetting { key, value } => {
            repo.set_setting(&key, value)?;
            Response::Ack(Ack::OK)
        }
    };

    debug!("event=api_dispatch module=api status=ok action={action}");
    Ok(response)
}

/// Decodes a JSON request, dispatches it and encodes the response.
pub fn dispatch_json<A: StorageAdapter>(
    repo: &NotesRepository<A>,
    raw: &str,
) -> Result<String, ApiError> {
    let request: Request = serde_json::from_str(raw).map_err(|err| {
        warn!("event=api_dispatch module=api status=error error_code=invalid_request");
        ApiError::InvalidRequest(err)
    })?;
    let response = dispatch(repo, request)?;
    serde_json::to_string(&response).map_err(ApiError::Encode)
}
