macro_rules! create_auriga_env {
    ($name: literal) => {
        concat!("AURIGA_", $name)
    };
}

/// Known environment variables
pub const AURIGA_CLUSTER: &str = create_auriga_env!("CLUSTER");
pub const AURIGA_CONFIG_DIR: &str = create_auriga_env!("CONFIG_DIR");
pub const AURIGA_MOCK_PBS: &str = create_auriga_env!("MOCK_PBS");
pub const AURIGA_WORKSPACE_DIR: &str = create_auriga_env!("WORKSPACE_DIR");

/// Default account/project used for submissions when none is passed explicitly.
pub const PBS_ACCOUNT: &str = "PBS_ACCOUNT";
