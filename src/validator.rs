//! Application-profile validation over the neutral model.
//!
//! The validator reports every violation, not just the first, and never
//! mutates its input. Findings come back as data; a run that reports
//! problems is still a successful run.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::model::{CellValue, Row, Sheet, Workbook};
use crate::profile::{
    Constraint, ConstraintKind, NodeKind, Profile, Property, Shape, Violation,
};

static IRI_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap_or_else(|_| unreachable!("literal pattern"))
});
static FULL_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap_or_else(|_| unreachable!("literal pattern"))
});
static DATE_TIME_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}").unwrap_or_else(|_| unreachable!("literal pattern"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// A row whose shape cannot be resolved is an error.
    #[default]
    Strict,
    /// Unresolvable rows are skipped silently.
    Loose,
}

#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    pub mode: ValidationMode,
    /// Drop warning-severity findings from the result.
    pub include_warnings: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            include_warnings: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileValidator {
    options: ValidatorOptions,
}

impl ProfileValidator {
    pub fn new(options: ValidatorOptions) -> Self {
        Self { options }
    }

    /// Validate every sheet of a workbook against a profile.
    pub fn validate(&self, workbook: &Workbook, profile: &Profile) -> Vec<Violation> {
        let mut violations = Vec::new();
        for sheet in &workbook.sheets {
            violations.extend(self.validate_sheet(sheet, profile));
        }
        if !self.options.include_warnings {
            violations.retain(Violation::is_error);
        }
        violations
    }

    /// Validate one sheet. A sheet without headers is a single structural
    /// error; nothing else can be checked against it.
    pub fn validate_sheet(&self, sheet: &Sheet, profile: &Profile) -> Vec<Violation> {
        let Some(headers) = sheet.headers.as_ref().filter(|headers| !headers.is_empty()) else {
            return vec![
                Violation::error("Sheet must have headers for profile validation")
                    .suggest("Add a header row with property names"),
            ];
        };

        let mut violations = Vec::new();
        for (index, row) in sheet.rows.iter().enumerate() {
            // Data rows are numbered from 2; row 1 is the header row.
            let row_number = index as u32 + 2;
            violations.extend(self.validate_row(row, row_number, headers, profile));
        }
        violations
    }

    fn validate_row(
        &self,
        row: &Row,
        row_number: u32,
        headers: &[String],
        profile: &Profile,
    ) -> Vec<Violation> {
        let Some(shape) = determine_shape(row, profile) else {
            if self.options.mode == ValidationMode::Strict {
                return vec![
                    Violation::error("Could not determine shape for row")
                        .at_row(row_number)
                        .suggest("Add a type column or ensure the row matches a defined shape"),
                ];
            }
            return Vec::new();
        };

        let mut violations = Vec::new();
        for property in &shape.properties {
            violations.extend(self.validate_property(row, row_number, property, headers));
        }
        violations
    }

    fn validate_property(
        &self,
        row: &Row,
        row_number: u32,
        property: &Property,
        headers: &[String],
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        let columns = find_property_columns(property, headers);

        if columns.is_empty() {
            if property.mandatory {
                violations.push(
                    Violation::error(format!(
                        "Missing mandatory property: {}",
                        property.display_name()
                    ))
                    .at_row(row_number)
                    .for_property(&property.id)
                    .suggest(format!("Add a column for {}", property.id)),
                );
            }
            return violations;
        }

        for column in &columns {
            let value = row.get(column.as_str()).unwrap_or(&CellValue::Null);

            if value.is_empty() {
                if property.mandatory {
                    violations.push(
                        Violation::error(format!(
                            "Missing value for mandatory property: {}",
                            property.display_name()
                        ))
                        .at_row(row_number)
                        .in_column(column.clone())
                        .for_property(&property.id)
                        .suggest("Provide a value for this property"),
                    );
                }
                continue;
            }

            violations.extend(check_node_kind(value, property, row_number, column));
            if let Some(constraint) = &property.constraint {
                violations.extend(check_constraint(value, property, constraint, row_number, column));
            }
        }

        if !property.repeatable && columns.len() > 1 {
            let populated = columns
                .iter()
                .filter(|column| {
                    row.get(column.as_str())
                        .map(|value| !value.is_empty())
                        .unwrap_or(false)
                })
                .count();
            if populated > 1 {
                violations.push(
                    Violation::warning(format!(
                        "Non-repeatable property has multiple values: {}",
                        property.display_name()
                    ))
                    .at_row(row_number)
                    .for_property(&property.id)
                    .suggest("Use only one column for non-repeatable properties"),
                );
            }
        }

        violations
    }
}

/// Resolve the shape governing a row: a type-ish column whose value names a
/// shape identifier, falling back to the profile's sole shape.
fn determine_shape<'a>(row: &Row, profile: &'a Profile) -> Option<&'a Shape> {
    let type_value = ["type", "Type", "rdf:type"]
        .iter()
        .find_map(|key| row.get(*key))
        .filter(|value| !value.is_empty());

    if let Some(value) = type_value {
        let text = value.to_plain_string();
        for (id, shape) in &profile.shapes {
            if text.contains(id.as_str()) {
                return Some(shape);
            }
        }
    }
    profile.single_shape()
}

/// Resolve the header columns implementing a property: exact id, label,
/// `id@lang` (declared language or any), and `id[n]` when array-valued.
fn find_property_columns(property: &Property, headers: &[String]) -> Vec<String> {
    let mut columns = Vec::new();

    if headers.iter().any(|header| header == &property.id) {
        columns.push(property.id.clone());
    }
    if let Some(label) = &property.label {
        if headers.iter().any(|header| header == label) {
            columns.push(label.clone());
        }
    }

    match &property.language {
        Some(language) => {
            let tagged = format!("{}@{}", property.id, language);
            if headers.iter().any(|header| header == &tagged) {
                columns.push(tagged);
            }
        }
        None => {
            if let Ok(pattern) =
                Regex::new(&format!(r"^{}@\w+$", regex::escape(&property.id)))
            {
                columns.extend(
                    headers
                        .iter()
                        .filter(|header| pattern.is_match(header))
                        .cloned(),
                );
            }
        }
    }

    if property.is_array {
        if let Ok(pattern) = Regex::new(&format!(r"^{}\[\d+\]$", regex::escape(&property.id))) {
            columns.extend(
                headers
                    .iter()
                    .filter(|header| pattern.is_match(header))
                    .cloned(),
            );
        }
    }

    columns
}

fn check_node_kind(
    value: &CellValue,
    property: &Property,
    row_number: u32,
    column: &str,
) -> Vec<Violation> {
    let primitive = value.primitive();
    match property.node_kind {
        Some(NodeKind::Iri) => {
            if !is_valid_iri(primitive) {
                return vec![
                    Violation::error(format!("Invalid IRI: {}", primitive.to_plain_string()))
                        .at_row(row_number)
                        .in_column(column)
                        .for_property(&property.id)
                        .suggest("Use a valid URL or URI"),
                ];
            }
            Vec::new()
        }
        Some(NodeKind::Literal) => property
            .datatype
            .as_deref()
            .map(|datatype| check_datatype(primitive, datatype, property, row_number, column))
            .unwrap_or_default(),
        Some(NodeKind::BlankNode) | None => Vec::new(),
    }
}

fn check_datatype(
    value: &CellValue,
    datatype: &str,
    property: &Property,
    row_number: u32,
    column: &str,
) -> Vec<Violation> {
    let text = value.to_plain_string();
    let finding = match datatype {
        "xsd:string" => None,
        "xsd:integer" | "xsd:int" => (!is_integer(value)).then(|| {
            Violation::error(format!("Value must be an integer: {text}"))
                .suggest("Use a whole number without decimals")
        }),
        "xsd:decimal" | "xsd:float" | "xsd:double" => (!is_numeric(value)).then(|| {
            Violation::error(format!("Value must be a number: {text}"))
                .suggest("Use a valid numeric value")
        }),
        "xsd:boolean" => {
            let lower = text.to_ascii_lowercase();
            (!matches!(lower.as_str(), "true" | "false" | "1" | "0")).then(|| {
                Violation::error(format!("Value must be a boolean: {text}"))
                    .suggest("Use true, false, 1, or 0")
            })
        }
        "xsd:date" => (!is_valid_date(value)).then(|| {
            Violation::error(format!("Invalid date format: {text}"))
                .suggest("Use ISO date format (YYYY-MM-DD)")
        }),
        "xsd:dateTime" => (!is_valid_date_time(value)).then(|| {
            Violation::error(format!("Invalid datetime format: {text}"))
                .suggest("Use ISO datetime format (YYYY-MM-DDTHH:mm:ss)")
        }),
        // Unknown datatypes are not checked.
        _ => None,
    };

    finding
        .map(|violation| {
            vec![violation
                .at_row(row_number)
                .in_column(column)
                .for_property(&property.id)]
        })
        .unwrap_or_default()
}

fn check_constraint(
    value: &CellValue,
    property: &Property,
    constraint: &Constraint,
    row_number: u32,
    column: &str,
) -> Vec<Violation> {
    let text = value.primitive().to_plain_string();
    let finding = match constraint.kind {
        ConstraintKind::Picklist => {
            let allowed: Vec<&str> = constraint.value.split('|').map(str::trim).collect();
            (!allowed.contains(&text.as_str())).then(|| {
                Violation::error(format!("Value not in allowed list: {text}"))
                    .suggest(format!("Use one of: {}", allowed.join(", ")))
            })
        }
        ConstraintKind::Pattern => match Regex::new(&constraint.value) {
            Ok(pattern) => (!pattern.is_match(&text)).then(|| {
                Violation::error(format!("Value does not match pattern: {text}"))
                    .suggest(format!("Value must match pattern: {}", constraint.value))
            }),
            // A broken pattern is a profile defect, reported as a warning
            // so data validation can continue.
            Err(_) => Some(
                Violation::warning(format!(
                    "Invalid regex pattern in profile: {}",
                    constraint.value
                ))
                .suggest("Fix the pattern in the profile"),
            ),
        },
        ConstraintKind::MinLength => constraint.value.parse::<usize>().ok().and_then(|min| {
            let length = text.chars().count();
            (length < min).then(|| {
                Violation::error(format!(
                    "Value too short: {length} characters (minimum: {min})"
                ))
                .suggest(format!("Provide at least {min} characters"))
            })
        }),
        ConstraintKind::MaxLength => constraint.value.parse::<usize>().ok().and_then(|max| {
            let length = text.chars().count();
            (length > max).then(|| {
                Violation::error(format!(
                    "Value too long: {length} characters (maximum: {max})"
                ))
                .suggest(format!("Limit to {max} characters"))
            })
        }),
    };

    finding
        .map(|violation| {
            vec![violation
                .at_row(row_number)
                .in_column(column)
                .for_property(&property.id)]
        })
        .unwrap_or_default()
}

/// IRI values must be strings that parse as a URL or at least carry a
/// URI scheme (covering URNs).
fn is_valid_iri(value: &CellValue) -> bool {
    match value {
        CellValue::Text(text) => Url::parse(text).is_ok() || IRI_SCHEME.is_match(text),
        _ => false,
    }
}

fn is_integer(value: &CellValue) -> bool {
    match value {
        CellValue::Number(number) => number.is_finite() && number.fract() == 0.0,
        CellValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(|number| number.is_finite() && number.fract() == 0.0)
            .unwrap_or(false),
        _ => false,
    }
}

fn is_numeric(value: &CellValue) -> bool {
    match value {
        CellValue::Number(_) => true,
        CellValue::Text(text) => text.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_valid_date(value: &CellValue) -> bool {
    match value {
        CellValue::Date(_) => true,
        CellValue::Text(text) => {
            FULL_DATE.is_match(text) && text.parse::<chrono::NaiveDate>().is_ok()
        }
        _ => false,
    }
}

fn is_valid_date_time(value: &CellValue) -> bool {
    match value {
        CellValue::Date(_) => true,
        CellValue::Text(text) => {
            DATE_TIME_PREFIX.is_match(text)
                && text
                    .get(..10)
                    .map(|day| day.parse::<chrono::NaiveDate>().is_ok())
                    .unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sheet;
    use crate::profile::Severity;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn single_shape_profile(property: Property) -> Profile {
        Profile::new().with_shape(Shape::new("Concept").with_property(property))
    }

    fn sheet_with(headers: &[&str], rows: Vec<Row>) -> Sheet {
        let mut sheet =
            Sheet::with_headers("terms", headers.iter().map(|h| h.to_string()).collect());
        sheet.rows = rows;
        sheet
    }

    #[test]
    fn headerless_sheet_is_a_single_structural_error() {
        let validator = ProfileValidator::default();
        let violations =
            validator.validate_sheet(&Sheet::new("bare"), &single_shape_profile(Property::new("x")));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("headers"));
    }

    #[test]
    fn missing_mandatory_column_is_an_error() {
        let profile = single_shape_profile(Property::new("title").mandatory());
        let sheet = sheet_with(&["label"], vec![row(&[("label", CellValue::Text("x".into()))])]);
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert!(violations
            .iter()
            .any(|v| v.is_error() && v.property.as_deref() == Some("title")));
    }

    #[test]
    fn empty_mandatory_value_points_at_row_and_column() {
        let profile = single_shape_profile(Property::new("title").mandatory());
        let sheet = sheet_with(&["title"], vec![row(&[("title", CellValue::Null)])]);
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].row, Some(2));
        assert_eq!(violations[0].column.as_deref(), Some("title"));
    }

    #[test]
    fn language_tagged_columns_resolve_without_declared_language() {
        let property = Property::new("title");
        let headers = vec!["title@en".to_string(), "title@fr".to_string()];
        let columns = find_property_columns(&property, &headers);
        assert_eq!(columns, ["title@en", "title@fr"]);
    }

    #[test]
    fn declared_language_resolves_only_its_column() {
        let property = Property::new("title").language("en");
        let headers = vec!["title@en".to_string(), "title@fr".to_string()];
        let columns = find_property_columns(&property, &headers);
        assert_eq!(columns, ["title@en"]);
    }

    #[test]
    fn array_properties_resolve_indexed_columns() {
        let property = Property::new("note").array();
        let headers = vec!["note[0]".to_string(), "note[1]".to_string(), "notes".to_string()];
        let columns = find_property_columns(&property, &headers);
        assert_eq!(columns, ["note[0]", "note[1]"]);
    }

    #[test]
    fn shape_resolution_prefers_the_type_column() {
        let profile = Profile::new()
            .with_shape(Shape::new("Concept"))
            .with_shape(Shape::new("Scheme"));
        let typed = row(&[("type", CellValue::Text("skos:Concept".into()))]);
        assert_eq!(determine_shape(&typed, &profile).map(|s| s.id.as_str()), Some("Concept"));
        let untyped = row(&[("label", CellValue::Text("x".into()))]);
        assert_eq!(determine_shape(&untyped, &profile), None);
    }

    #[test]
    fn unresolvable_shape_is_an_error_only_in_strict_mode() {
        let profile = Profile::new()
            .with_shape(Shape::new("A"))
            .with_shape(Shape::new("B"));
        let sheet = sheet_with(&["label"], vec![row(&[("label", CellValue::Text("x".into()))])]);

        let strict = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(strict.len(), 1);

        let loose = ProfileValidator::new(ValidatorOptions {
            mode: ValidationMode::Loose,
            ..ValidatorOptions::default()
        })
        .validate_sheet(&sheet, &profile);
        assert!(loose.is_empty());
    }

    #[test]
    fn iri_node_kind_accepts_urls_and_urns() {
        assert!(is_valid_iri(&CellValue::Text("https://example.org/x".into())));
        assert!(is_valid_iri(&CellValue::Text("urn:isbn:0451450523".into())));
        assert!(!is_valid_iri(&CellValue::Text("not an iri".into())));
        assert!(!is_valid_iri(&CellValue::Number(5.0)));
    }

    #[test]
    fn integer_datatype_rejects_fractions() {
        let profile =
            single_shape_profile(Property::new("count").datatype("xsd:integer"));
        let sheet = sheet_with(&["count"], vec![row(&[("count", CellValue::Number(1.5))])]);
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("integer"));
    }

    #[test]
    fn boolean_datatype_accepts_numeric_forms() {
        let profile = single_shape_profile(Property::new("flag").datatype("xsd:boolean"));
        let ok = sheet_with(&["flag"], vec![row(&[("flag", CellValue::Text("1".into()))])]);
        assert!(ProfileValidator::default().validate_sheet(&ok, &profile).is_empty());
        let bad = sheet_with(&["flag"], vec![row(&[("flag", CellValue::Text("yes".into()))])]);
        assert_eq!(ProfileValidator::default().validate_sheet(&bad, &profile).len(), 1);
    }

    #[test]
    fn date_datatype_requires_a_full_iso_date() {
        let profile = single_shape_profile(Property::new("issued").datatype("xsd:date"));
        let bad = sheet_with(
            &["issued"],
            vec![row(&[("issued", CellValue::Text("2024-01".into()))])],
        );
        assert_eq!(ProfileValidator::default().validate_sheet(&bad, &profile).len(), 1);
        let ok = sheet_with(
            &["issued"],
            vec![row(&[(
                "issued",
                CellValue::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            )])],
        );
        assert!(ProfileValidator::default().validate_sheet(&ok, &profile).is_empty());
    }

    #[test]
    fn picklist_constraint_lists_allowed_values() {
        let profile = single_shape_profile(
            Property::new("status").constraint(ConstraintKind::Picklist, "draft|published"),
        );
        let sheet = sheet_with(
            &["status"],
            vec![row(&[("status", CellValue::Text("archived".into()))])],
        );
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].suggestion.as_deref(),
            Some("Use one of: draft, published")
        );
    }

    #[test]
    fn broken_pattern_is_a_profile_warning_not_a_data_error() {
        let profile = single_shape_profile(
            Property::new("code").constraint(ConstraintKind::Pattern, "("),
        );
        let sheet = sheet_with(&["code"], vec![row(&[("code", CellValue::Text("x".into()))])]);
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn repeated_values_on_non_repeatable_property_warn() {
        let profile = single_shape_profile(Property::new("title"));
        let sheet = sheet_with(
            &["title@en", "title@fr"],
            vec![row(&[
                ("title@en", CellValue::Text("a".into())),
                ("title@fr", CellValue::Text("b".into())),
            ])],
        );
        let violations = ProfileValidator::default().validate_sheet(&sheet, &profile);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn warnings_are_dropped_when_disabled() {
        let profile = single_shape_profile(Property::new("title"));
        let mut sheet = sheet_with(
            &["title@en", "title@fr"],
            vec![row(&[
                ("title@en", CellValue::Text("a".into())),
                ("title@fr", CellValue::Text("b".into())),
            ])],
        );
        sheet.name = "terms".into();
        let workbook = Workbook::single(sheet);
        let validator = ProfileValidator::new(ValidatorOptions {
            include_warnings: false,
            ..ValidatorOptions::default()
        });
        assert!(validator.validate(&workbook, &profile).is_empty());
    }

    #[test]
    fn validation_is_idempotent() {
        let profile = single_shape_profile(Property::new("title").mandatory());
        let sheet = sheet_with(&["title"], vec![row(&[("title", CellValue::Null)])]);
        let workbook = Workbook::single(sheet);
        let validator = ProfileValidator::default();
        let first = validator.validate(&workbook, &profile);
        let second = validator.validate(&workbook, &profile);
        assert_eq!(first, second);
    }
}
