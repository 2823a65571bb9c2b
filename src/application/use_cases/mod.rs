pub mod billing_run;
pub mod payment_refresh;
