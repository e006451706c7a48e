//! Environment overrides for the config file. Kept in its own test binary
//! because it mutates process environment.

use gf_core::config::{Config, ENV_LLM_URL, ENV_PERSIST_URL};

#[test]
fn env_overrides_win_over_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[llm]\nbase_url = \"http://file-gateway/api/llm\"\n\n[persistence]\nremote_url = \"http://file-store/state\"\n",
    )
    .unwrap();

    std::env::set_var(ENV_LLM_URL, "http://env-gateway/api/llm");
    std::env::set_var(ENV_PERSIST_URL, "http://env-store/state");
    let overridden = Config::load_from(&path);

    // Blank values leave the file untouched.
    std::env::set_var(ENV_LLM_URL, "  ");
    std::env::remove_var(ENV_PERSIST_URL);
    let from_file = Config::load_from(&path);
    std::env::remove_var(ENV_LLM_URL);

    let overridden = overridden.unwrap();
    assert_eq!(overridden.llm.base_url, "http://env-gateway/api/llm");
    assert_eq!(
        overridden.persistence.remote_url.as_deref(),
        Some("http://env-store/state")
    );

    let from_file = from_file.unwrap();
    assert_eq!(from_file.llm.base_url, "http://file-gateway/api/llm");
    assert_eq!(
        from_file.persistence.remote_url.as_deref(),
        Some("http://file-store/state")
    );
}
