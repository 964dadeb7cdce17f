//! The schema-file-parsing collaborator (§4.5, explicitly out of core
//! scope per §1). The core only needs an entry point; what reads YAML off
//! disk is somebody else's problem.

use hound_abi::{Result, SchemaDescriptor};

/// `parse(schema_base, schema_file) -> Vec<SchemaDescriptor>`, invoked by
/// the registry during `register_driver` (§4.2 step 4). The core validates
/// and finalizes what comes back via [`SchemaDescriptor::finalize`]; it
/// does not care how the descriptors were produced.
pub trait SchemaSource: Send + Sync {
    fn load(&self, schema_base: &str, schema_file: &str) -> Result<Vec<SchemaDescriptor>>;
}
