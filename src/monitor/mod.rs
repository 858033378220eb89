//! Filesystem monitoring: disk usage probing.

pub mod fs_stats;
