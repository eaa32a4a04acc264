//! Reserved field names.
//!
//! Reserved fields are written by the repository itself. Stores treat them
//! like any other field; the structural invariants they describe are kept by
//! the writer.

/// Unique, immutable document id (`Value::String`).
pub const KEY_ID: &str = "id";

/// Id of the parent document (`Value::Reference`); absent on the root.
pub const KEY_PARENT_ID: &str = "parentId";

/// Name, unique among siblings sharing a parent.
pub const KEY_NAME: &str = "name";

/// Document type name.
pub const KEY_PRIMARY_TYPE: &str = "primaryType";

/// Ids of all ancestors, root first (`Value::Array` of references).
pub const KEY_ANCESTOR_IDS: &str = "ancestorIds";

/// Stored access control policy (`Value::Array` of ACL objects).
pub const KEY_ACP: &str = "acp";

/// Whether the document is a proxy.
pub const KEY_IS_PROXY: &str = "isProxy";

/// Target of a proxy; present iff `isProxy` is true.
pub const KEY_PROXY_TARGET_ID: &str = "proxyTargetId";

/// Proxies pointing at this document.
pub const KEY_PROXY_IDS: &str = "proxyIds";

/// Whether the document is a version.
pub const KEY_IS_VERSION: &str = "isVersion";

/// Live document a version was checked in from.
pub const KEY_VERSION_SERIES_ID: &str = "versionSeriesId";

/// Human readable version label, `major.minor`.
pub const KEY_VERSION_LABEL: &str = "versionLabel";

/// Major version number.
pub const KEY_MAJOR_VERSION: &str = "majorVersion";

/// Minor version number.
pub const KEY_MINOR_VERSION: &str = "minorVersion";

/// Check-in time of a version.
pub const KEY_VERSION_CREATED: &str = "versionCreated";

/// Whether a live document is currently checked in.
pub const KEY_IS_CHECKED_IN: &str = "isCheckedIn";

/// Last version checked in from a live document.
pub const KEY_BASE_VERSION_ID: &str = "baseVersionId";

/// Extracted simple-text fulltext.
pub const KEY_FULLTEXT_SIMPLE: &str = "fulltextSimple";

/// Extracted binary-text fulltext.
pub const KEY_FULLTEXT_BINARY: &str = "fulltextBinary";

/// Pending fulltext job shared by several documents.
pub const KEY_FULLTEXT_JOB_ID: &str = "fulltextJobId";

/// Returns true for field names written only by the repository.
#[must_use]
pub fn is_system_key(key: &str) -> bool {
    matches!(
        key,
        KEY_ID
            | KEY_PARENT_ID
            | KEY_NAME
            | KEY_PRIMARY_TYPE
            | KEY_ANCESTOR_IDS
            | KEY_ACP
            | KEY_IS_PROXY
            | KEY_PROXY_TARGET_ID
            | KEY_PROXY_IDS
            | KEY_IS_VERSION
            | KEY_VERSION_SERIES_ID
            | KEY_VERSION_LABEL
            | KEY_MAJOR_VERSION
            | KEY_MINOR_VERSION
            | KEY_VERSION_CREATED
            | KEY_IS_CHECKED_IN
            | KEY_BASE_VERSION_ID
            | KEY_FULLTEXT_SIMPLE
            | KEY_FULLTEXT_BINARY
            | KEY_FULLTEXT_JOB_ID
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_keys() {
        assert!(is_system_key(KEY_ID));
        assert!(is_system_key(KEY_PROXY_IDS));
        assert!(!is_system_key("title"));
    }
}
