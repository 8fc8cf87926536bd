pub mod dedup;
pub mod dispatcher;
pub mod email;

pub use dedup::{DedupKey, DedupTable, ErrorClass, ErrorDedupWindow, DEDUP_WINDOW};
pub use dispatcher::AlertDispatcher;
pub use email::{
    build_email, email_body, AlertContext, ALERT_EVENT, ALERT_SUBJECT, INFERENCE_TEST_EVENT,
    TEST_ALERT_EVENT, TEST_SUBJECT,
};
