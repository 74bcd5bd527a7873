use serde::{Deserialize, Serialize};

use crate::event::{CaseDraft, CaseId, Secret, UserDraft, UserId, Username, ValidationError};
use crate::listing::{FieldValue, Listed};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseRecord {
    pub case_id: CaseId,
    pub case_name: String,
    #[serde(default)]
    pub clue_count: u64,
    pub add_user_id: UserId,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CaseField {
    #[default]
    CaseId,
    CaseName,
    ClueCount,
    AddUserId,
}

impl Listed for CaseRecord {
    type Id = CaseId;
    type Key = CaseId;
    type Field = CaseField;
    type Draft = CaseDraft;

    const DEFAULT_FILTER_FIELD: CaseField = CaseField::CaseId;
    const DEFAULT_SORT_FIELD: CaseField = CaseField::CaseId;

    fn id(&self) -> &CaseId {
        &self.case_id
    }

    fn key(&self) -> &CaseId {
        &self.case_id
    }

    fn field(&self, field: CaseField) -> FieldValue<'_> {
        match field {
            CaseField::CaseId => FieldValue::Text(self.case_id.as_str()),
            CaseField::CaseName => FieldValue::Text(&self.case_name),
            CaseField::ClueCount => FieldValue::Number(self.clue_count),
            CaseField::AddUserId => FieldValue::Number(self.add_user_id.0),
        }
    }

    fn required_fields(draft: &CaseDraft) -> Vec<(&'static str, &str)> {
        vec![
            ("case_id", draft.case_id.as_str()),
            ("case_name", draft.case_name.as_str()),
        ]
    }

    fn draft_key(draft: &CaseDraft) -> Result<CaseId, ValidationError> {
        CaseId::parse(&draft.case_id)
    }
}

impl CaseRecord {
    /// Local copy of a case the backend just accepted.
    pub fn created(case_id: CaseId, draft: &CaseDraft, creator: UserId) -> Self {
        Self {
            case_id,
            case_name: draft.case_name.clone(),
            clue_count: 0,
            add_user_id: creator,
        }
    }

    /// The record after an accepted edit; counters are kept.
    #[must_use]
    pub fn edited(&self, case_id: CaseId, draft: &CaseDraft) -> Self {
        Self {
            case_id,
            case_name: draft.case_name.clone(),
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    #[serde(rename = "id")]
    pub user_id: UserId,
    pub username: Username,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub default_phone: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UserField {
    #[default]
    UserId,
    Username,
    IsAdmin,
    DefaultPhone,
}

impl Listed for UserRecord {
    type Id = UserId;
    type Key = Username;
    type Field = UserField;
    type Draft = UserDraft;

    const DEFAULT_FILTER_FIELD: UserField = UserField::Username;
    const DEFAULT_SORT_FIELD: UserField = UserField::UserId;

    fn id(&self) -> &UserId {
        &self.user_id
    }

    fn key(&self) -> &Username {
        &self.username
    }

    fn field(&self, field: UserField) -> FieldValue<'_> {
        match field {
            UserField::UserId => FieldValue::Number(self.user_id.0),
            UserField::Username => FieldValue::Text(self.username.as_str()),
            UserField::IsAdmin => FieldValue::Flag(self.is_admin),
            UserField::DefaultPhone => self
                .default_phone
                .as_deref()
                .map_or(FieldValue::Absent, FieldValue::Text),
        }
    }

    fn required_fields(draft: &UserDraft) -> Vec<(&'static str, &str)> {
        vec![
            ("username", draft.username.as_str()),
            ("password", draft.password.expose()),
            ("confirm_password", draft.confirm_password.expose()),
        ]
    }

    fn draft_key(draft: &UserDraft) -> Result<Username, ValidationError> {
        if draft.username.trim() != draft.username {
            return Err(ValidationError::syntax(
                "username",
                "leading or trailing whitespace",
            ));
        }
        if draft.password != draft.confirm_password {
            return Err(ValidationError::syntax(
                "confirm_password",
                "does not match password",
            ));
        }
        Ok(Username::new(draft.username.as_str()))
    }
}

impl UserRecord {
    pub fn is_administrator(&self) -> bool {
        self.is_admin
    }
}

// --- Wire shapes ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseListResponse {
    pub data: Vec<CaseRecord>,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UsersEnvelope<T> {
    pub users: T,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DataResponse<T> {
    pub data: T,
    #[serde(default)]
    pub message: String,
}

pub type UserListResponse = DataResponse<UsersEnvelope<Vec<UserRecord>>>;
pub type CurrentUserResponse = DataResponse<UsersEnvelope<UserRecord>>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoginResponse {
    pub access_token: Secret,
    pub refresh_token: Secret,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RefreshResponse {
    pub access_token: Secret,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn case(id: &str, name: &str, clues: u64, creator: u64) -> CaseRecord {
        CaseRecord {
            case_id: CaseId::new(id),
            case_name: name.into(),
            clue_count: clues,
            add_user_id: UserId(creator),
        }
    }

    #[test]
    fn test_case_list_wire_shape() {
        let body = r#"{"data":[{"case_id":"A0000000000000000000001","case_name":"Foo","clue_count":3,"add_user_id":1}],"message":"ok"}"#;
        let parsed: CaseListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data, vec![case("A0000000000000000000001", "Foo", 3, 1)]);
    }

    #[test]
    fn test_user_wire_shapes() {
        let list = r#"{"data":{"users":[{"id":2,"username":"bob","is_admin":false,"default_phone":null}]},"message":""}"#;
        let parsed: UserListResponse = serde_json::from_str(list).unwrap();
        assert_eq!(parsed.data.users[0].user_id, UserId(2));
        assert_eq!(parsed.data.users[0].default_phone, None);

        let current = r#"{"data":{"users":{"id":1,"username":"admin","is_admin":true,"default_phone":"555"}},"message":"ok"}"#;
        let parsed: CurrentUserResponse = serde_json::from_str(current).unwrap();
        assert!(parsed.data.users.is_administrator());
    }

    #[test]
    fn test_case_fields() {
        let c = case("A0000000000000000000001", "Foo", 3, 7);
        assert_eq!(c.field(CaseField::CaseId), FieldValue::Text("A0000000000000000000001"));
        assert_eq!(c.field(CaseField::ClueCount), FieldValue::Number(3));
        assert_eq!(c.field(CaseField::AddUserId), FieldValue::Number(7));
    }

    #[test]
    fn test_case_draft_key() {
        let ok = CaseDraft::new("A0000000000000000000002", "Foo");
        assert_eq!(CaseRecord::draft_key(&ok), Ok(CaseId::new("A0000000000000000000002")));
        let bad = CaseDraft::new("A12", "Foo");
        assert_matches!(CaseRecord::draft_key(&bad), Err(ValidationError::Syntax { .. }));
    }

    #[test]
    fn test_created_and_edited_case() {
        let draft = CaseDraft::new("A0000000000000000000002", "Foo");
        let created = CaseRecord::created(CaseId::new("A0000000000000000000002"), &draft, UserId(4));
        assert_eq!(created.clue_count, 0);
        assert_eq!(created.add_user_id, UserId(4));

        let with_clues = CaseRecord {
            clue_count: 5,
            ..created
        };
        let renamed = with_clues.edited(
            CaseId::new("A0000000000000000000003"),
            &CaseDraft::new("A0000000000000000000003", "Bar"),
        );
        assert_eq!(renamed.clue_count, 5);
        assert_eq!(renamed.case_name, "Bar");
    }

    #[test]
    fn test_user_draft_key_checks_confirmation() {
        let ok = UserDraft::new("carol", "pw", "pw");
        assert_eq!(UserRecord::draft_key(&ok), Ok(Username::new("carol")));
        let mismatch = UserDraft::new("carol", "pw", "pw2");
        assert_matches!(
            UserRecord::draft_key(&mismatch),
            Err(ValidationError::Syntax {
                field: "confirm_password",
                ..
            })
        );
        let padded = UserDraft::new(" carol", "pw", "pw");
        assert_matches!(UserRecord::draft_key(&padded), Err(ValidationError::Syntax { .. }));
    }

    #[test]
    fn test_user_phone_absent() {
        let user = UserRecord {
            user_id: UserId(3),
            username: Username::new("dave"),
            is_admin: false,
            default_phone: None,
        };
        assert_eq!(user.field(UserField::DefaultPhone), FieldValue::Absent);
        assert_eq!(user.field(UserField::IsAdmin), FieldValue::Flag(false));
    }

    #[test]
    fn test_login_response_is_redacted() {
        let parsed: LoginResponse =
            serde_json::from_str(r#"{"access_token":"aaa","refresh_token":"rrr"}"#).unwrap();
        assert_eq!(parsed.access_token.expose(), "aaa");
        assert!(!format!("{parsed:?}").contains("rrr"));
    }
}
