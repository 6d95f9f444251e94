use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::auth::ApiError;

/// JSON body extractor that runs `validator` rules before the handler sees
/// the payload. Rejections use the standard envelope with HTTP 400.
pub struct ValidatedForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedForm<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::Validation(flatten_errors(&e)))?;
        Ok(ValidatedForm(value))
    }
}

fn flatten_errors(errors: &validator::ValidationErrors) -> String {
    errors.to_string().replace('\n', ", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Validate)]
    struct Probe {
        #[validate(email)]
        email: String,
    }

    #[test]
    fn flattened_message_names_the_field() {
        let probe = Probe {
            email: "nope".into(),
        };
        let errors = probe.validate().unwrap_err();
        let message = flatten_errors(&errors);
        assert!(message.contains("email"));
    }
}
