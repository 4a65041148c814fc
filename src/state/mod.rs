pub mod registry_database;

pub use registry_database::{
    create_shared_registry_store, RegistryDatabase, RegistryStore, SharedRegistryStore,
};
