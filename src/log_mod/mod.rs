mod log_manager;
mod log_record;

pub use log_manager::{LogManager, RecoveryReport, LOG_HEADER_LEN};
pub use log_record::{CheckpointData, LogBody, LogRecord, LogRecordType, NO_LSN};
