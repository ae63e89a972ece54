use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestCodeSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerifyCodeSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 4, max = 12))]
    pub code: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileSchema {
    #[validate(length(min = 1, max = 128))]
    pub display_name: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// The username prefix to search for
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    pub username: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTaskSchema {
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignTaskSchema {
    #[validate(length(min = 3, max = 32))]
    pub owner_username: String,
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskNameSchema {
    #[validate(length(min = 1, max = 512))]
    pub name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDoneSchema {
    pub is_done: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDueDateSchema {
    /// Null clears the due date
    #[serde(deserialize_with = "nullable")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPrivacySchema {
    pub is_private: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveQuery {
    /// 1-based page number
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    /// Only tasks finished at or before this instant. Defaults to now.
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FriendRequestSchema {
    #[validate(range(min = 1))]
    pub recipient_id: i32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermissionSchema {
    pub can_create_tasks: bool,
}

/// Requires the field to be present, while still allowing null
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

#[cfg(test)]
mod test {
    use validator::Validate;

    use super::{NewTaskSchema, RequestCodeSchema, TaskDueDateSchema};

    #[test]
    fn task_names_must_not_be_empty() {
        let schema: NewTaskSchema = serde_json::from_str(r#"{ "name": "" }"#).unwrap();
        assert!(schema.validate().is_err());

        let schema: NewTaskSchema =
            serde_json::from_str(r#"{ "name": "Buy milk", "dueDate": "2024-05-21" }"#).unwrap();
        assert!(schema.validate().is_ok());
        assert!(!schema.is_private);
    }

    #[test]
    fn emails_are_validated() {
        let schema: RequestCodeSchema =
            serde_json::from_str(r#"{ "email": "not an email" }"#).unwrap();
        assert!(schema.validate().is_err());
    }

    #[test]
    fn due_date_must_be_given_but_may_be_null() {
        let cleared: TaskDueDateSchema = serde_json::from_str(r#"{ "dueDate": null }"#).unwrap();
        assert_eq!(cleared.due_date, None);

        let missing = serde_json::from_str::<TaskDueDateSchema>("{}");
        assert!(missing.is_err());
    }
}
