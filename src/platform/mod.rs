//! Platform abstraction: the OS capabilities (mount table, block devices,
//! mount/unmount, file moves, filesystem statistics) behind one trait.

pub mod blkid;
pub mod mock;
pub mod mount_table;
pub mod pal;
