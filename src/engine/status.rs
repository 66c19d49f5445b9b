use crate::error::AppError;
use crate::models::order::ShopOrderStatus;

/// Owner-driven status moves. Delivered is terminal and is only ever set
/// by OTP verification, so it is not a legal target here. Re-issuing the
/// current status is allowed; downstream dispatch is guarded by the
/// no-existing-assignment precondition and stays idempotent.
pub fn validate_transition(
    from: ShopOrderStatus,
    to: ShopOrderStatus,
) -> Result<(), AppError> {
    match (from, to) {
        (ShopOrderStatus::Delivered, _) => Err(AppError::Conflict(
            "shop order is already delivered".to_string(),
        )),
        (_, ShopOrderStatus::Delivered) => Err(AppError::BadRequest(
            "delivery is confirmed with the customer otp, not a status change".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::models::order::ShopOrderStatus::*;

    use super::validate_transition;

    #[test]
    fn forward_and_backward_moves_are_legal() {
        assert!(validate_transition(Pending, Preparing).is_ok());
        assert!(validate_transition(Preparing, OutForDelivery).is_ok());
        assert!(validate_transition(OutForDelivery, Preparing).is_ok());
    }

    #[test]
    fn reissuing_the_current_status_is_legal() {
        assert!(validate_transition(OutForDelivery, OutForDelivery).is_ok());
    }

    #[test]
    fn delivered_is_terminal() {
        assert!(matches!(
            validate_transition(Delivered, Preparing),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn owner_cannot_set_delivered_directly() {
        assert!(matches!(
            validate_transition(OutForDelivery, Delivered),
            Err(AppError::BadRequest(_))
        ));
    }
}
