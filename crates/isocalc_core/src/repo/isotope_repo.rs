//! Isotope catalog repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Write paths validate input through `IsotopeDraft::validated()`.
//! - Catalog listing returns active isotopes ordered by `name, uuid`.
//! - Isotopes are deactivated, never removed, by catalog workflows.

use crate::model::isotope::{Isotope, IsotopeDraft, IsotopeId};
use crate::repo::{
    bool_to_int, ensure_connection_ready, parse_uuid, EntityKind, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ISOTOPE_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    description,
    half_life_years,
    atomic_mass,
    decay_type,
    application,
    image_url,
    is_active
FROM isotopes";

/// Query options for listing isotopes.
#[derive(Debug, Clone, Default)]
pub struct IsotopeListQuery {
    pub include_inactive: bool,
}

/// Repository interface for the isotope catalog.
pub trait IsotopeRepository {
    fn create_isotope(&self, draft: &IsotopeDraft) -> RepoResult<Isotope>;
    fn update_isotope(&self, id: IsotopeId, draft: &IsotopeDraft) -> RepoResult<Isotope>;
    fn set_isotope_active(&self, id: IsotopeId, is_active: bool) -> RepoResult<()>;
    fn get_isotope(&self, id: IsotopeId) -> RepoResult<Option<Isotope>>;
    fn list_isotopes(&self, query: &IsotopeListQuery) -> RepoResult<Vec<Isotope>>;
}

/// SQLite-backed isotope repository.
pub struct SqliteIsotopeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIsotopeRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["isotopes"])?;
        Ok(Self { conn })
    }
}

impl IsotopeRepository for SqliteIsotopeRepository<'_> {
    fn create_isotope(&self, draft: &IsotopeDraft) -> RepoResult<Isotope> {
        let isotope = draft.validated()?.into_isotope();

        self.conn.execute(
            "INSERT INTO isotopes (
                uuid,
                name,
                description,
                half_life_years,
                atomic_mass,
                decay_type,
                application,
                image_url,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                isotope.id.to_string(),
                isotope.name.as_str(),
                isotope.description.as_str(),
                isotope.half_life_years,
                isotope.atomic_mass,
                isotope.decay_type.as_str(),
                isotope.application.as_str(),
                isotope.image_url.as_deref(),
                bool_to_int(isotope.is_active),
            ],
        )?;

        Ok(isotope)
    }

    fn update_isotope(&self, id: IsotopeId, draft: &IsotopeDraft) -> RepoResult<Isotope> {
        let normalized = draft.validated()?;

        let changed = self.conn.execute(
            "UPDATE isotopes
             SET
                name = ?2,
                description = ?3,
                half_life_years = ?4,
                atomic_mass = ?5,
                decay_type = ?6,
                application = ?7,
                image_url = ?8
             WHERE uuid = ?1;",
            params![
                id.to_string(),
                normalized.name.as_str(),
                normalized.description.as_str(),
                normalized.half_life_years,
                normalized.atomic_mass,
                normalized.decay_type.as_str(),
                normalized.application.as_str(),
                normalized.image_url.as_deref(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::Isotope, id));
        }

        self.get_isotope(id)?
            .ok_or_else(|| RepoError::not_found(EntityKind::Isotope, id))
    }

    fn set_isotope_active(&self, id: IsotopeId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE isotopes SET is_active = ?2 WHERE uuid = ?1;",
            params![id.to_string(), bool_to_int(is_active)],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::Isotope, id));
        }
        Ok(())
    }

    fn get_isotope(&self, id: IsotopeId) -> RepoResult<Option<Isotope>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ISOTOPE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let isotope = stmt
            .query_row([id.to_string()], |row| Ok(parse_isotope_row(row)))
            .optional()?;
        isotope.transpose()
    }

    fn list_isotopes(&self, query: &IsotopeListQuery) -> RepoResult<Vec<Isotope>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ISOTOPE_SELECT_SQL}
             WHERE (?1 = 1 OR is_active = 1)
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query([bool_to_int(query.include_inactive)])?;
        let mut isotopes = Vec::new();
        while let Some(row) = rows.next()? {
            isotopes.push(parse_isotope_row(row)?);
        }
        Ok(isotopes)
    }
}

fn parse_isotope_row(row: &Row<'_>) -> RepoResult<Isotope> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "isotopes.uuid")?;

    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in isotopes.is_active"
            )));
        }
    };

    Ok(Isotope {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        half_life_years: row.get("half_life_years")?,
        atomic_mass: row.get("atomic_mass")?,
        decay_type: row.get("decay_type")?,
        application: row.get("application")?,
        image_url: row.get("image_url")?,
        is_active,
    })
}
