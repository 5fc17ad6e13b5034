pub mod primitives;
pub mod options;
pub mod index;
pub mod container;
pub mod crypto;
pub mod codec;
pub mod store;
pub mod export;

pub use options::ScanOptions;
pub use index::{ContainerIndex, ContainerRecord, IndexHeader, RecordVariant};
pub use container::{ContainerFileRecord, ContainerFileTable, FileTableError};
pub use codec::{decode, encode, is_wrapped, SaveCodecError};
pub use store::{scan_package, scan_packages, ContainerError, PackageScan, StoreError};
