// ============================================================================
// DOMAIN ERROR -> HTTP ERROR
// ============================================================================

use shared::AppError;

use crate::domains::redemptions::{RedemptionError, ScanError};

impl From<RedemptionError> for AppError {
    fn from(err: RedemptionError) -> Self {
        let reason = Some(err.reason());
        let message = err.to_string();

        match err {
            RedemptionError::Expired => AppError::Gone { message, reason },
            RedemptionError::AlreadyUsed | RedemptionError::LimitReached { .. } => {
                AppError::Conflict { message, reason }
            }
            RedemptionError::NotEntitled
            | RedemptionError::WrongMerchant
            | RedemptionError::MerchantNotLinked => AppError::Authorization { message, reason },
            RedemptionError::OfferInactive | RedemptionError::InvalidCode(_) => {
                AppError::BadRequest { message, reason }
            }
            RedemptionError::DetectorUnsupported => AppError::Unprocessable { message, reason },
            RedemptionError::ClaimNotFound => AppError::not_found("code"),
            RedemptionError::OfferNotFound => AppError::not_found("offer"),
            RedemptionError::Store(_)
            | RedemptionError::Presentation(_)
            | RedemptionError::ManualCodeTaken => AppError::internal(message),
        }
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Rejected(inner) => inner.into(),
            ScanError::CameraDenied => AppError::Unprocessable {
                message: err.to_string(),
                reason: Some(err.reason()),
            },
            ScanError::InvalidTransition { .. } => AppError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::redemptions::LimitScope;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RedemptionError::Expired, StatusCode::GONE),
            (RedemptionError::AlreadyUsed, StatusCode::CONFLICT),
            (
                RedemptionError::LimitReached { scope: LimitScope::Total, limit: 1 },
                StatusCode::CONFLICT,
            ),
            (RedemptionError::WrongMerchant, StatusCode::FORBIDDEN),
            (RedemptionError::NotEntitled, StatusCode::FORBIDDEN),
            (RedemptionError::OfferInactive, StatusCode::BAD_REQUEST),
            (RedemptionError::DetectorUnsupported, StatusCode::UNPROCESSABLE_ENTITY),
            (RedemptionError::ClaimNotFound, StatusCode::NOT_FOUND),
            (RedemptionError::Store("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_business_messages_are_public() {
        let err = AppError::from(RedemptionError::AlreadyUsed);
        assert_eq!(err.public_message(), "This code was already used");
        assert_eq!(err.reason(), Some("already_used"));

        let err = AppError::from(RedemptionError::Store("connection reset".into()));
        assert!(!err.public_message().contains("connection reset"));
    }
}
