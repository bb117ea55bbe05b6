//! Behavioural scenarios for `ostack-backup backup`.

mod backup;
