//! # Database Schema
//!
//! SQL schema definitions for the vault database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐     │
//! │  │    accounts     │    │     backups     │    │ login_attempts  │     │
//! │  ├─────────────────┤    ├─────────────────┤    ├─────────────────┤     │
//! │  │ username        │    │ did             │    │ username        │     │
//! │  │ did             │───►│ record (JSON)   │    │ failed_attempts │     │
//! │  │ signing_key     │    │ updated_at      │    │ last_attempt_ms │     │
//! │  │ encryption_key  │    └─────────────────┘    └─────────────────┘     │
//! │  │ encrypted_key   │                                                    │
//! │  │ created_at      │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐     │
//! │  │    profiles     │    │  collaborators  │    │     grants      │     │
//! │  ├─────────────────┤    ├─────────────────┤    ├─────────────────┤     │
//! │  │ did             │    │ did             │    │ id              │     │
//! │  │ profile (JSON)  │    │ display_name    │    │ granter_did     │     │
//! │  │ updated_at      │    │ encryption_key  │    │ subject_did     │     │
//! │  └─────────────────┘    │ added_at        │    │ resource_id     │     │
//! │                         └─────────────────┘    │ issued_at       │     │
//! │                                                │ grant (JSON)    │     │
//! │                                                └─────────────────┘     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records with a wire format of their own (backups, profiles, grants) are
//! kept as their JSON text so a read returns exactly what was written.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Local accounts
-- One row per username; the seed is only ever stored sealed
CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY,
    -- Decentralized Identifier (did:key:...)
    did TEXT NOT NULL,
    -- Ed25519 public key (hex encoded, 64 chars)
    signing_key TEXT NOT NULL,
    -- X25519 public key (hex encoded, 64 chars)
    encryption_key TEXT NOT NULL,
    -- EncryptedKeyRecord as JSON
    encrypted_key TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CONSTRAINT did_format CHECK (did LIKE 'did:key:%')
);
CREATE INDEX IF NOT EXISTS idx_accounts_did ON accounts(did);

-- Identity backup records, as published to remote stores
CREATE TABLE IF NOT EXISTS backups (
    did TEXT PRIMARY KEY,
    -- SyncedIdentityRecord JSON, stored verbatim
    record TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Consecutive failed unlocks per username
CREATE TABLE IF NOT EXISTS login_attempts (
    username TEXT PRIMARY KEY,
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    -- Unix milliseconds of the latest failure
    last_attempt_ms INTEGER NOT NULL
);

-- Public profiles
CREATE TABLE IF NOT EXISTS profiles (
    did TEXT PRIMARY KEY,
    -- PublicProfile JSON
    profile TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- People the local user shares documents with
CREATE TABLE IF NOT EXISTS collaborators (
    did TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    -- X25519 public key (hex encoded, 64 chars)
    encryption_key TEXT NOT NULL,
    added_at INTEGER NOT NULL
);

-- Capability grants, issued or accepted
CREATE TABLE IF NOT EXISTS grants (
    id TEXT PRIMARY KEY,
    granter_did TEXT NOT NULL,
    subject_did TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    issued_at INTEGER NOT NULL,
    -- CapabilityGrant JSON
    grant_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_grants_subject ON grants(subject_did, issued_at);
"#;

/// SQL to drop all tables (for testing/reset)
pub const DROP_TABLES: &str = r#"
DROP TABLE IF EXISTS grants;
DROP TABLE IF EXISTS collaborators;
DROP TABLE IF EXISTS profiles;
DROP TABLE IF EXISTS login_attempts;
DROP TABLE IF EXISTS backups;
DROP TABLE IF EXISTS accounts;
DROP TABLE IF EXISTS schema_version;
"#;
