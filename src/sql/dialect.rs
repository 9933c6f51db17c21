//! The dialect catalog: static, read-only descriptions of the SQL dialects the
//! mock engine emulates, and the versions of each that it recognizes. The
//! parser consults a [`DialectVersion`] to decide which grammar productions
//! are legal, and nothing else in the crate branches on the dialect.

use crate::errconfig;
use crate::error::Result;

/// How a dialect spells table-level hints, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HintStyle {
    /// No hints are accepted.
    None,
    /// SQL Server style: `WITH (NOLOCK, INDEX(...))`, the legacy `(NOLOCK)`
    /// form, and the `OPTION (...)` query hint.
    Table,
    /// MySQL style: `USE|IGNORE|FORCE INDEX|KEY [FOR ...] (...)`.
    Index,
}

/// A SQL dialect. Catalog entries are `'static` and never change at runtime.
#[derive(Debug, PartialEq, Eq)]
pub struct Dialect {
    /// The unique, lowercase dialect name.
    pub name: &'static str,
    /// Recognized versions, ascending and non-empty.
    pub versions: &'static [u32],
    /// Minimum version accepting `OFFSET n ROWS FETCH NEXT m ROWS ONLY`.
    pub paging_min_version: Option<u32>,
    /// If true, OFFSET/FETCH paging requires an ORDER BY clause.
    pub paging_requires_order_by: bool,
    /// Minimum version accepting `FETCH FIRST n ROWS ONLY` without OFFSET.
    pub fetch_first_min_version: Option<u32>,
    /// Accepts `LIMIT n [OFFSET m]`.
    pub limit_offset: bool,
    /// Accepts `SELECT TOP n`.
    pub top: bool,
    /// Minimum version accepting `WITH` common table expressions.
    pub cte_min_version: Option<u32>,
    /// Minimum version accepting `WITH RECURSIVE`.
    pub recursive_cte_min_version: Option<u32>,
    /// Accepts `AS [NOT] MATERIALIZED` on common table expressions.
    pub materialized_hint: bool,
    /// The table hint syntax.
    pub hints: HintStyle,
    /// Accepts `ON CONFLICT ... DO UPDATE | DO NOTHING`.
    pub on_conflict: bool,
    /// Accepts `ON DUPLICATE KEY UPDATE`.
    pub on_duplicate_key_update: bool,
    /// Accepts `DELETE table WHERE ...` without FROM.
    pub delete_without_from: bool,
    /// Minimum version accepting `MERGE INTO ... USING ...`.
    pub merge_min_version: Option<u32>,
    /// Identifiers may be quoted with backticks.
    pub backtick_identifiers: bool,
    /// Identifiers may be quoted with square brackets.
    pub bracket_identifiers: bool,
    /// Double quotes delimit strings rather than identifiers.
    pub double_quote_strings: bool,
    /// Backslash escapes are recognized in string literals.
    pub backslash_escapes: bool,
    /// `#` starts a line comment.
    pub hash_comments: bool,
    /// The named parameter prefix.
    pub parameter_prefix: char,
    /// The prefix is written in SQL text (`WHERE id = @id`).
    pub prefix_in_sql: bool,
    /// The prefix is part of parameter names (`@id` rather than `id`).
    pub prefix_in_parameter_name: bool,
}

/// The dialect catalog.
static DIALECTS: [Dialect; 6] = [
    Dialect {
        name: "db2",
        versions: &[8, 9, 10, 11],
        paging_min_version: None,
        paging_requires_order_by: false,
        fetch_first_min_version: Some(8),
        limit_offset: true,
        top: false,
        cte_min_version: Some(8),
        recursive_cte_min_version: Some(8),
        materialized_hint: false,
        hints: HintStyle::None,
        on_conflict: false,
        on_duplicate_key_update: false,
        delete_without_from: false,
        merge_min_version: Some(9),
        backtick_identifiers: false,
        bracket_identifiers: false,
        double_quote_strings: false,
        backslash_escapes: false,
        hash_comments: false,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
    Dialect {
        name: "mysql",
        versions: &[3, 4, 5, 8],
        paging_min_version: Some(3),
        paging_requires_order_by: false,
        fetch_first_min_version: None,
        limit_offset: true,
        top: false,
        cte_min_version: Some(8),
        recursive_cte_min_version: Some(8),
        materialized_hint: false,
        hints: HintStyle::Index,
        on_conflict: false,
        on_duplicate_key_update: true,
        delete_without_from: true,
        merge_min_version: None,
        backtick_identifiers: true,
        bracket_identifiers: false,
        double_quote_strings: true,
        backslash_escapes: true,
        hash_comments: true,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
    Dialect {
        name: "postgresql",
        versions: &[6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17],
        paging_min_version: Some(6),
        paging_requires_order_by: false,
        fetch_first_min_version: Some(6),
        limit_offset: true,
        top: false,
        cte_min_version: Some(6),
        recursive_cte_min_version: Some(6),
        materialized_hint: true,
        hints: HintStyle::None,
        on_conflict: true,
        on_duplicate_key_update: false,
        delete_without_from: false,
        merge_min_version: Some(15),
        backtick_identifiers: false,
        bracket_identifiers: false,
        double_quote_strings: false,
        backslash_escapes: false,
        hash_comments: false,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
    Dialect {
        name: "oracle",
        versions: &[7, 8, 9, 10, 11, 12, 18, 19, 21, 23],
        paging_min_version: Some(12),
        paging_requires_order_by: false,
        fetch_first_min_version: Some(12),
        limit_offset: false,
        top: true,
        cte_min_version: Some(9),
        recursive_cte_min_version: None,
        materialized_hint: false,
        hints: HintStyle::None,
        on_conflict: false,
        on_duplicate_key_update: false,
        delete_without_from: false,
        merge_min_version: Some(9),
        backtick_identifiers: false,
        bracket_identifiers: true,
        double_quote_strings: false,
        backslash_escapes: false,
        hash_comments: false,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
    Dialect {
        name: "sqlserver",
        versions: &[2000, 2005, 2008, 2012, 2014, 2016, 2017, 2019, 2022],
        paging_min_version: Some(2012),
        paging_requires_order_by: true,
        fetch_first_min_version: None,
        limit_offset: false,
        top: true,
        cte_min_version: Some(2005),
        recursive_cte_min_version: None,
        materialized_hint: false,
        hints: HintStyle::Table,
        on_conflict: false,
        on_duplicate_key_update: false,
        delete_without_from: true,
        merge_min_version: Some(2008),
        backtick_identifiers: false,
        bracket_identifiers: true,
        double_quote_strings: false,
        backslash_escapes: false,
        hash_comments: false,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
    Dialect {
        name: "sqlite",
        versions: &[3],
        paging_min_version: Some(3),
        paging_requires_order_by: false,
        fetch_first_min_version: None,
        limit_offset: true,
        top: false,
        cte_min_version: Some(3),
        recursive_cte_min_version: Some(3),
        materialized_hint: true,
        hints: HintStyle::None,
        on_conflict: true,
        on_duplicate_key_update: true,
        delete_without_from: false,
        merge_min_version: None,
        backtick_identifiers: true,
        bracket_identifiers: false,
        double_quote_strings: true,
        backslash_escapes: false,
        hash_comments: false,
        parameter_prefix: '@',
        prefix_in_sql: true,
        prefix_in_parameter_name: true,
    },
];

impl Dialect {
    /// Returns all catalog entries.
    pub fn all() -> &'static [Dialect] {
        &DIALECTS
    }

    /// Looks up a dialect by name, case-insensitively.
    pub fn lookup(name: &str) -> Result<&'static Dialect> {
        match DIALECTS.iter().find(|d| d.name.eq_ignore_ascii_case(name)) {
            Some(dialect) => Ok(dialect),
            None => errconfig!("unknown dialect {name}"),
        }
    }

    /// Returns the recognized versions, ascending.
    pub fn versions(&self) -> &'static [u32] {
        self.versions
    }

    /// Returns the newest recognized version.
    pub fn latest_version(&self) -> u32 {
        self.versions.last().copied().unwrap_or_default()
    }

    /// Pairs the dialect with one of its versions.
    pub fn at(&'static self, version: u32) -> Result<DialectVersion> {
        if !self.versions.contains(&version) {
            return errconfig!("{} has no version {version}, expected one of {:?}", self.name, self.versions);
        }
        Ok(DialectVersion { dialect: self, version })
    }

    /// Enumerates versions matching a filter, for building per-version test
    /// matrices. An empty selection is an error, since it silently drops
    /// every case it was meant to generate.
    pub fn select_versions(&self, filter: &VersionFilter) -> Result<Vec<u32>> {
        let versions: Vec<u32> =
            self.versions.iter().copied().filter(|v| filter.matches(*v)).collect();
        if versions.is_empty() {
            return errconfig!("no {} versions match {filter:?}", self.name);
        }
        Ok(versions)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A version filter for [`Dialect::select_versions`]. All set bounds must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionFilter {
    /// Only these versions.
    pub specific: Option<Vec<u32>>,
    /// Versions greater than or equal to this.
    pub at_least: Option<u32>,
    /// Versions less than or equal to this.
    pub at_most: Option<u32>,
    /// Versions strictly less than this.
    pub below: Option<u32>,
}

impl VersionFilter {
    /// Matches versions greater than or equal to the given version.
    pub fn at_least(version: u32) -> Self {
        Self { at_least: Some(version), ..Default::default() }
    }

    /// Matches versions strictly below the given version.
    pub fn below(version: u32) -> Self {
        Self { below: Some(version), ..Default::default() }
    }

    /// Matches versions less than or equal to the given version.
    pub fn at_most(version: u32) -> Self {
        Self { at_most: Some(version), ..Default::default() }
    }

    /// Matches only the given versions.
    pub fn specific(versions: &[u32]) -> Self {
        Self { specific: Some(versions.to_vec()), ..Default::default() }
    }

    fn matches(&self, version: u32) -> bool {
        self.specific.as_ref().is_none_or(|s| s.contains(&version))
            && self.at_least.is_none_or(|min| version >= min)
            && self.at_most.is_none_or(|max| version <= max)
            && self.below.is_none_or(|below| version < below)
    }
}

/// A dialect at a specific version. Every parse and execution is performed
/// under one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialectVersion {
    pub dialect: &'static Dialect,
    pub version: u32,
}

impl DialectVersion {
    /// Looks up a dialect by name and pairs it with the given version.
    pub fn new(name: &str, version: u32) -> Result<Self> {
        Dialect::lookup(name)?.at(version)
    }

    /// Whether the version is at or above an optional threshold.
    fn reaches(&self, threshold: Option<u32>) -> bool {
        threshold.is_some_and(|min| self.version >= min)
    }

    /// `OFFSET n ROWS [FETCH NEXT m ROWS ONLY]`.
    pub fn supports_paging(&self) -> bool {
        self.reaches(self.dialect.paging_min_version)
    }

    /// `FETCH FIRST n ROWS ONLY`, without a preceding OFFSET. ANSI paging
    /// support doesn't imply it.
    pub fn supports_fetch_first(&self) -> bool {
        self.reaches(self.dialect.fetch_first_min_version)
    }

    /// `WITH name AS (...)`.
    pub fn supports_cte(&self) -> bool {
        self.reaches(self.dialect.cte_min_version)
    }

    /// `WITH RECURSIVE`.
    pub fn supports_recursive_cte(&self) -> bool {
        self.reaches(self.dialect.recursive_cte_min_version)
    }

    /// `MERGE INTO target USING source ON ...`.
    pub fn supports_merge(&self) -> bool {
        self.reaches(self.dialect.merge_min_version)
    }
}

impl std::fmt::Display for DialectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.dialect.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = Dialect::all().iter().map(|d| d.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Dialect::all().len());
    }

    #[test]
    fn catalog_versions_are_ascending_and_non_empty() {
        for dialect in Dialect::all() {
            assert!(!dialect.versions().is_empty(), "{dialect} has no versions");
            assert!(dialect.versions().windows(2).all(|w| w[0] < w[1]), "{dialect}");
        }
    }

    #[test]
    fn lookup_is_case_insensitive() -> Result<()> {
        assert_eq!(Dialect::lookup("SqlServer")?.name, "sqlserver");
        assert!(matches!(Dialect::lookup("informix"), Err(Error::Configuration(_))));
        Ok(())
    }

    #[test]
    fn at_rejects_unknown_versions() -> Result<()> {
        let mysql = Dialect::lookup("mysql")?;
        assert_eq!(mysql.at(8)?.version, 8);
        assert!(matches!(mysql.at(7), Err(Error::Configuration(_))));
        Ok(())
    }

    #[test]
    fn select_versions() -> Result<()> {
        let sqlserver = Dialect::lookup("sqlserver")?;
        assert_eq!(sqlserver.select_versions(&VersionFilter::below(2008))?, vec![2000, 2005]);
        assert_eq!(
            sqlserver.select_versions(&VersionFilter::at_least(2017))?,
            vec![2017, 2019, 2022]
        );
        assert_eq!(sqlserver.select_versions(&VersionFilter::at_most(2000))?, vec![2000]);
        assert_eq!(
            sqlserver.select_versions(&VersionFilter {
                at_least: Some(2008),
                below: Some(2014),
                ..Default::default()
            })?,
            vec![2008, 2012]
        );
        assert_eq!(
            sqlserver.select_versions(&VersionFilter::specific(&[2005, 2099]))?,
            vec![2005]
        );
        Ok(())
    }

    #[test]
    fn select_versions_empty_is_error() -> Result<()> {
        let sqlite = Dialect::lookup("sqlite")?;
        assert!(matches!(
            sqlite.select_versions(&VersionFilter::below(3)),
            Err(Error::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn capability_thresholds() -> Result<()> {
        let oracle = Dialect::lookup("oracle")?;
        assert!(!oracle.at(11)?.supports_paging());
        assert!(oracle.at(12)?.supports_paging());
        assert!(oracle.at(9)?.supports_cte());
        assert!(!oracle.at(8)?.supports_cte());
        assert!(!oracle.at(23)?.supports_recursive_cte());

        let db2 = Dialect::lookup("db2")?;
        assert!(!db2.at(11)?.supports_paging());
        assert!(db2.at(8)?.supports_fetch_first());
        assert!(!db2.at(8)?.supports_merge());
        assert!(db2.at(9)?.supports_merge());

        let postgresql = Dialect::lookup("postgresql")?;
        assert!(!postgresql.at(14)?.supports_merge());
        assert!(postgresql.at(15)?.supports_merge());
        assert!(!Dialect::lookup("sqlite")?.at(3)?.supports_merge());

        for (name, version) in [("sqlserver", 2012), ("sqlserver", 2022), ("mysql", 8), ("sqlite", 3)] {
            let dialect = Dialect::lookup(name)?.at(version)?;
            assert!(dialect.supports_paging(), "{dialect}");
            assert!(!dialect.supports_fetch_first(), "{dialect}");
        }
        Ok(())
    }

    #[test]
    fn named_parameter_convention() {
        for dialect in Dialect::all() {
            assert_eq!(dialect.parameter_prefix, '@');
            assert!(dialect.prefix_in_sql);
            assert!(dialect.prefix_in_parameter_name);
        }
    }
}
