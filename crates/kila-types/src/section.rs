//! Content sections and the people allowed to edit them.
//!
//! A section is a named, ownable group of blocks anchored to a page region
//! (`page_section_id`, e.g. `"camp"` or `"registration"`). The owner always
//! keeps edit rights; admins can grant more editors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{SectionId, UserId};

/// Site-wide role of a signed-in user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum UserRole {
    /// Regular member (parents, helpers).
    #[default]
    Member,
    /// Camp leadership ("Leitung"): staff who may create sections.
    #[strum(serialize = "leitung", serialize = "staff")]
    Leitung,
    /// Site administrator.
    Admin,
}

impl UserRole {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Member => "member",
            UserRole::Leitung => "leitung",
            UserRole::Admin => "admin",
        }
    }

    /// Admins and leadership count as staff.
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Leitung | UserRole::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed-in user acting on sections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    /// Display name recorded as owner/editor name.
    pub name: String,
    pub role: UserRole,
}

impl Principal {
    /// Create a new principal with a fresh ID.
    pub fn new(name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Only staff may create new sections.
    pub fn can_create_sections(&self) -> bool {
        self.role.is_staff()
    }

    /// Owner, admins, and assigned editors may edit a section.
    pub fn can_edit(&self, section: &ContentSection) -> bool {
        self.is_admin() || section.owner_id == self.id || section.editor_ids.contains(&self.id)
    }

    /// Owner and admins may delete a section.
    pub fn can_delete(&self, section: &ContentSection) -> bool {
        self.is_admin() || section.owner_id == self.id
    }

    /// Only admins may change a section's editor list.
    pub fn can_assign_editors(&self) -> bool {
        self.is_admin()
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.role)
    }
}

/// A named, ownable grouping of blocks rendered under one heading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSection {
    pub id: SectionId,
    pub page_section_id: String,
    pub title: String,
    pub owner_id: UserId,
    pub owner_name: String,
    /// Extra users granted edit rights by an admin.
    pub editor_ids: Vec<UserId>,
    pub show_author: bool,
    pub show_publish_date: bool,
    pub publish_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentSection {
    /// The display metadata as an editable draft.
    pub fn meta(&self) -> SectionMeta {
        SectionMeta {
            show_author: self.show_author,
            show_publish_date: self.show_publish_date,
            publish_date: self.publish_date,
        }
    }
}

/// Display metadata, independent of edit rights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMeta {
    pub show_author: bool,
    pub show_publish_date: bool,
    pub publish_date: Option<NaiveDate>,
}

/// Input for creating a section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSection {
    pub page_section_id: String,
    pub title: String,
    pub owner_id: UserId,
    pub owner_name: String,
}

/// Partial update for a section. `None` means "leave unchanged".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionPatch {
    pub title: Option<String>,
    pub editor_ids: Option<Vec<UserId>>,
    pub show_author: Option<bool>,
    pub show_publish_date: Option<bool>,
    pub publish_date: Option<Option<NaiveDate>>,
}

impl SectionPatch {
    /// Difference between the persisted section and an edited title + meta.
    pub fn between(section: &ContentSection, title: &str, meta: &SectionMeta) -> Self {
        let mut patch = Self::default();
        if title != section.title {
            patch.title = Some(title.to_string());
        }
        if meta.show_author != section.show_author {
            patch.show_author = Some(meta.show_author);
        }
        if meta.show_publish_date != section.show_publish_date {
            patch.show_publish_date = Some(meta.show_publish_date);
        }
        if meta.publish_date != section.publish_date {
            patch.publish_date = Some(meta.publish_date);
        }
        patch
    }

    /// Check if the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.editor_ids.is_none()
            && self.show_author.is_none()
            && self.show_publish_date.is_none()
            && self.publish_date.is_none()
    }

    /// Apply this patch to a section in place (store-side helper).
    pub fn apply_to(&self, section: &mut ContentSection) {
        if let Some(title) = &self.title {
            section.title = title.clone();
        }
        if let Some(editor_ids) = &self.editor_ids {
            section.editor_ids = editor_ids.clone();
        }
        if let Some(show_author) = self.show_author {
            section.show_author = show_author;
        }
        if let Some(show_publish_date) = self.show_publish_date {
            section.show_publish_date = show_publish_date;
        }
        if let Some(publish_date) = self.publish_date {
            section.publish_date = publish_date;
        }
    }
}

/// Parse a publish date typed into a form; blank input means "no date".
pub fn parse_publish_date(input: &str) -> Result<Option<NaiveDate>, chrono::ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    // Accept both plain dates and full timestamps.
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map(Some)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn section_owned_by(owner: &Principal) -> ContentSection {
        ContentSection {
            id: SectionId::new(),
            page_section_id: "camp".into(),
            title: "Camp Info".into(),
            owner_id: owner.id,
            owner_name: owner.name.clone(),
            editor_ids: Vec::new(),
            show_author: false,
            show_publish_date: false,
            publish_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_parse_aliases() {
        assert_eq!("staff".parse::<UserRole>().unwrap(), UserRole::Leitung);
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!(UserRole::Leitung.is_staff());
        assert!(!UserRole::Member.is_staff());
    }

    #[test]
    fn test_edit_rights() {
        let owner = Principal::new("Mia", UserRole::Leitung);
        let admin = Principal::new("Ada", UserRole::Admin);
        let helper = Principal::new("Hans", UserRole::Member);
        let mut section = section_owned_by(&owner);

        assert!(owner.can_edit(&section));
        assert!(admin.can_edit(&section));
        assert!(!helper.can_edit(&section));

        section.editor_ids.push(helper.id);
        assert!(helper.can_edit(&section));
        assert!(!helper.can_delete(&section));
        assert!(owner.can_delete(&section));
        assert!(!owner.can_assign_editors());
        assert!(admin.can_assign_editors());
    }

    #[test]
    fn test_patch_between_detects_meta_changes() {
        let owner = Principal::new("Mia", UserRole::Leitung);
        let section = section_owned_by(&owner);
        assert!(SectionPatch::between(&section, "Camp Info", &section.meta()).is_empty());

        let mut meta = section.meta();
        meta.show_author = true;
        meta.publish_date = NaiveDate::from_ymd_opt(2025, 7, 1);
        let patch = SectionPatch::between(&section, "Camp", &meta);
        assert_eq!(patch.title.as_deref(), Some("Camp"));
        assert_eq!(patch.show_author, Some(true));
        assert_eq!(patch.publish_date, Some(NaiveDate::from_ymd_opt(2025, 7, 1)));
        assert!(patch.show_publish_date.is_none());
    }

    #[test]
    fn test_parse_publish_date() {
        assert_eq!(parse_publish_date("  ").unwrap(), None);
        assert_eq!(
            parse_publish_date("2025-07-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 1)
        );
        assert_eq!(
            parse_publish_date("2025-07-01T00:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 1)
        );
        assert!(parse_publish_date("July").is_err());
    }
}
