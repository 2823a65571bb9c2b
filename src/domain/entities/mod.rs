pub mod addon_subscription;
pub mod payment_status;
pub mod run_clock;
pub mod school_setting;
pub mod subscription;
pub mod subscription_bill;
pub mod user_status;
