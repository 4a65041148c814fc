pub mod checkin_manager;
pub mod gateway_manager;
pub mod membership_manager;
pub mod notification_manager;
pub mod payment_manager;
pub mod registration_manager;

#[cfg(test)]
pub mod testing;

pub use checkin_manager::{create_shared_checkin_manager, SharedCheckInManager};
pub use gateway_manager::{create_shared_gateway_manager, SharedGatewayManager};
pub use membership_manager::{create_shared_membership_manager, SharedMembershipManager};
pub use notification_manager::{create_shared_notification_manager, SharedNotificationManager};
pub use payment_manager::{create_shared_payment_manager, SharedPaymentManager};
pub use registration_manager::{create_shared_registration_manager, SharedRegistrationManager};
