//! Group batch CSV ingestion.
//!
//! Turns an uploaded spreadsheet into batch rows with per-row validation
//! errors, and resolves stored rows back to distances and add-ons when the
//! batch is processed.

use std::collections::HashSet;

use shared::csv::CsvTable;
use shared::validation::{is_valid_email, normalize_email, parse_iso_date};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{AddOn, BatchRowInput, Distance, ParsedBatchRow};

pub const COL_DISTANCE: &str = "distance";
pub const COL_FIRST_NAME: &str = "first_name";
pub const COL_LAST_NAME: &str = "last_name";
pub const COL_EMAIL: &str = "email";
pub const COL_DATE_OF_BIRTH: &str = "date_of_birth";
pub const COL_PHONE: &str = "phone";
pub const COL_ADD_ONS: &str = "add_ons";

/// Column order of the downloadable template.
pub const TEMPLATE_HEADERS: [&str; 7] = [
    COL_DISTANCE,
    COL_FIRST_NAME,
    COL_LAST_NAME,
    COL_EMAIL,
    COL_DATE_OF_BIRTH,
    COL_PHONE,
    COL_ADD_ONS,
];

const REQUIRED_HEADERS: [&str; 4] = [COL_DISTANCE, COL_FIRST_NAME, COL_LAST_NAME, COL_EMAIL];

/// Separator between add-on references inside the `add_ons` cell.
pub const ADD_ON_SEPARATOR: char = ';';

/// Template CSV: header plus one example row.
pub fn group_batch_template_csv() -> String {
    CsvTable {
        headers: TEMPLATE_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows: vec![vec![
            "10K".to_string(),
            "Ada".to_string(),
            "Lovelace".to_string(),
            "ada@example.com".to_string(),
            "1990-04-12".to_string(),
            "+1 555 0100".to_string(),
            "Race shirt; Shuttle, return".to_string(),
        ]],
    }
    .to_csv()
}

/// Finds a distance by id or case-insensitive name.
pub fn find_distance<'a>(reference: &str, distances: &'a [Distance]) -> Option<&'a Distance> {
    let reference = reference.trim();
    if let Ok(id) = reference.parse::<Uuid>() {
        return distances.iter().find(|d| d.id == id);
    }
    distances
        .iter()
        .find(|d| d.name.trim().eq_ignore_ascii_case(reference))
}

/// Finds an add-on sold with `distance_id` by id or case-insensitive name.
pub fn find_add_on<'a>(
    reference: &str,
    distance_id: Uuid,
    add_ons: &'a [AddOn],
) -> Option<&'a AddOn> {
    let reference = reference.trim();
    let by_id = reference.parse::<Uuid>().ok();
    add_ons.iter().find(|a| {
        a.is_available_for(distance_id)
            && match by_id {
                Some(id) => a.id == id,
                None => a.name.trim().eq_ignore_ascii_case(reference),
            }
    })
}

/// Parses and validates an uploaded CSV.
///
/// Structural problems (bad CSV, missing columns, no rows, too many rows)
/// reject the whole upload. Field problems are recorded on the row.
/// Resolved distance and add-on references are stored as ids.
pub fn parse_batch_csv(
    input: &str,
    max_rows: usize,
    distances: &[Distance],
    add_ons: &[AddOn],
) -> Result<Vec<ParsedBatchRow>, DomainError> {
    let table = CsvTable::parse(input)
        .map_err(|e| DomainError::validation(format!("invalid CSV: {}", e)))?;

    let headers: Vec<String> = table.headers.iter().map(|h| h.to_lowercase()).collect();
    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|h| !headers.iter().any(|have| have == h))
        .collect();
    if !missing.is_empty() {
        return Err(DomainError::validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }
    if table.rows.is_empty() {
        return Err(DomainError::validation("CSV contains no participant rows"));
    }
    if table.rows.len() > max_rows {
        return Err(DomainError::validation(format!(
            "CSV has {} rows, the limit is {}",
            table.rows.len(),
            max_rows
        )));
    }

    let mut seen_emails = HashSet::new();
    let mut rows = Vec::with_capacity(table.rows.len());

    for index in 0..table.rows.len() {
        let Some(cells) = table.row_map(index) else {
            continue;
        };
        let cell = |name: &str| cells.get(name).map(|v| v.trim()).unwrap_or_default();
        let mut errors = Vec::new();

        let first_name = cell(COL_FIRST_NAME).to_string();
        if first_name.is_empty() {
            errors.push("first_name is required".to_string());
        }
        let last_name = cell(COL_LAST_NAME).to_string();
        if last_name.is_empty() {
            errors.push("last_name is required".to_string());
        }

        let email = normalize_email(cell(COL_EMAIL));
        if email.is_empty() {
            errors.push("email is required".to_string());
        } else if !is_valid_email(&email) {
            errors.push(format!("email '{}' is invalid", email));
        } else if !seen_emails.insert(email.clone()) {
            errors.push(format!("email '{}' appears more than once", email));
        }

        let dob_raw = cell(COL_DATE_OF_BIRTH);
        let date_of_birth = if dob_raw.is_empty() {
            None
        } else {
            let parsed = parse_iso_date(dob_raw);
            if parsed.is_none() {
                errors.push(format!("date_of_birth '{}' must be YYYY-MM-DD", dob_raw));
            }
            parsed
        };

        let phone = Some(cell(COL_PHONE).to_string()).filter(|p| !p.is_empty());

        let distance_ref = cell(COL_DISTANCE);
        let distance = if distance_ref.is_empty() {
            errors.push("distance is required".to_string());
            None
        } else {
            let found = find_distance(distance_ref, distances);
            if found.is_none() {
                errors.push(format!("unknown distance '{}'", distance_ref));
            }
            found
        };

        let mut resolved_add_ons = Vec::new();
        for reference in cell(COL_ADD_ONS)
            .split(ADD_ON_SEPARATOR)
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            match distance.and_then(|d| find_add_on(reference, d.id, add_ons)) {
                Some(add_on) => resolved_add_ons.push(add_on.id.to_string()),
                None => {
                    if distance.is_some() {
                        errors.push(format!("unknown add-on '{}'", reference));
                    }
                    resolved_add_ons.push(reference.to_string());
                }
            }
        }

        rows.push(ParsedBatchRow {
            row_index: index as i32,
            raw: BatchRowInput {
                distance: distance
                    .map(|d| d.id.to_string())
                    .unwrap_or_else(|| distance_ref.to_string()),
                first_name,
                last_name,
                email,
                date_of_birth,
                phone,
                add_ons: resolved_add_ons,
            },
            errors,
        });
    }

    Ok(rows)
}

/// Resolves a stored row against the edition's current distances and add-ons.
pub fn resolve_row<'a>(
    row: &BatchRowInput,
    distances: &'a [Distance],
    add_ons: &'a [AddOn],
) -> Result<(&'a Distance, Vec<&'a AddOn>), DomainError> {
    let distance = find_distance(&row.distance, distances).ok_or_else(|| {
        DomainError::validation(format!("unknown distance '{}'", row.distance))
    })?;

    let selected = row
        .add_ons
        .iter()
        .map(|reference| {
            find_add_on(reference, distance.id, add_ons)
                .ok_or_else(|| DomainError::validation(format!("unknown add-on '{}'", reference)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((distance, selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::CapacityScope;
    use chrono::NaiveDate;

    fn fixtures() -> (Vec<Distance>, Vec<AddOn>) {
        let edition_id = Uuid::new_v4();
        let ten_k = Distance {
            id: Uuid::new_v4(),
            edition_id,
            name: "10K".into(),
            capacity: Some(100),
            capacity_scope: CapacityScope::PerDistance,
            price_cents: 10_000,
        };
        let half = Distance {
            id: Uuid::new_v4(),
            name: "Half Marathon".into(),
            ..ten_k.clone()
        };
        let shirt = AddOn {
            id: Uuid::new_v4(),
            edition_id,
            distance_id: None,
            name: "Race shirt".into(),
            price_cents: 2_000,
            is_active: true,
        };
        let medal = AddOn {
            id: Uuid::new_v4(),
            distance_id: Some(half.id),
            name: "Finisher medal".into(),
            ..shirt.clone()
        };
        (vec![ten_k, half], vec![shirt, medal])
    }

    #[test]
    fn test_template_parses_back() {
        let csv = group_batch_template_csv();
        let table = CsvTable::parse(&csv).unwrap();
        assert_eq!(table.headers, TEMPLATE_HEADERS.to_vec());
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][6], "Race shirt; Shuttle, return");
        assert_eq!(CsvTable::parse(&table.to_csv()).unwrap(), table);
    }

    #[test]
    fn test_parse_valid_rows() {
        let (distances, add_ons) = fixtures();
        let csv = "\u{feff}Distance,First_Name,Last_Name,Email,date_of_birth,add_ons\r\n\
                   10k,Ada,Lovelace, ADA@Example.com ,1990-04-12,race shirt\r\n\
                   Half Marathon,\"Hopper, Grace\",Hopper,grace@example.com,,Finisher medal;Race shirt\r\n";

        let rows = parse_batch_csv(csv, 10, &distances, &add_ons).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.errors.is_empty()), "{:?}", rows);

        assert_eq!(rows[0].raw.distance, distances[0].id.to_string());
        assert_eq!(rows[0].raw.email, "ada@example.com");
        assert_eq!(rows[0].raw.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 12));
        assert_eq!(rows[0].raw.add_ons, vec![add_ons[0].id.to_string()]);

        assert_eq!(rows[1].raw.first_name, "Hopper, Grace");
        assert_eq!(rows[1].raw.add_ons.len(), 2);
        assert_eq!(rows[1].row_index, 1);
    }

    #[test]
    fn test_row_errors_are_recorded() {
        let (distances, add_ons) = fixtures();
        let csv = "distance,first_name,last_name,email,date_of_birth,add_ons\n\
                   5K,,Doe,not-an-email,12/04/1990,\n\
                   10K,Jo,Doe,jo@example.com,,Finisher medal\n\
                   10K,Jo,Roe,JO@example.com,,\n";

        let rows = parse_batch_csv(csv, 10, &distances, &add_ons).unwrap();
        assert_eq!(rows[0].errors.len(), 4, "{:?}", rows[0].errors);
        assert!(rows[0].errors.iter().any(|e| e.contains("unknown distance")));
        assert!(rows[1].errors.iter().any(|e| e.contains("unknown add-on")));
        assert!(rows[2].errors.iter().any(|e| e.contains("more than once")));
    }

    #[test]
    fn test_structural_errors_reject_upload() {
        let (distances, add_ons) = fixtures();

        let err = parse_batch_csv("first_name,email\nA,a@b.co\n", 10, &distances, &add_ons)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("distance"));

        let err = parse_batch_csv("distance,first_name,last_name,email\n", 10, &distances, &add_ons)
            .unwrap_err();
        assert!(err.message.contains("no participant rows"));

        let err = parse_batch_csv(
            "distance,first_name,last_name,email\n\"10K,A,B,a@b.co\n",
            10,
            &distances,
            &add_ons,
        )
        .unwrap_err();
        assert!(err.message.contains("invalid CSV"));

        let many = format!(
            "distance,first_name,last_name,email\n{}",
            "10K,A,B,a@b.co\n".repeat(3)
        );
        let err = parse_batch_csv(&many, 2, &distances, &add_ons).unwrap_err();
        assert!(err.message.contains("limit is 2"));
    }

    #[test]
    fn test_generated_roster_parses_cleanly() {
        use fake::faker::name::en::{FirstName, LastName};
        use fake::Fake;
        use shared::csv::write_record;

        let (distances, add_ons) = fixtures();
        let mut csv = write_record(&TEMPLATE_HEADERS);
        for i in 0..50 {
            let first: String = FirstName().fake();
            let last: String = LastName().fake();
            csv.push_str(&write_record(&[
                "Half Marathon".to_string(),
                first,
                last,
                format!("runner{}@example.com", i),
                String::new(),
                String::new(),
                "Finisher medal".to_string(),
            ]));
        }

        let rows = parse_batch_csv(&csv, 500, &distances, &add_ons).unwrap();
        assert_eq!(rows.len(), 50);
        assert!(rows.iter().all(|r| r.errors.is_empty()));
        assert!(rows.iter().all(|r| r.raw.distance == distances[1].id.to_string()));
    }

    #[test]
    fn test_resolve_row() {
        let (distances, add_ons) = fixtures();
        let row = BatchRowInput {
            distance: distances[1].id.to_string(),
            add_ons: vec![add_ons[1].id.to_string()],
            ..BatchRowInput::default()
        };
        let (distance, selected) = resolve_row(&row, &distances, &add_ons).unwrap();
        assert_eq!(distance.id, distances[1].id);
        assert_eq!(selected[0].id, add_ons[1].id);

        let unknown = BatchRowInput {
            distance: Uuid::new_v4().to_string(),
            ..BatchRowInput::default()
        };
        assert_eq!(
            resolve_row(&unknown, &distances, &add_ons).unwrap_err().code,
            ErrorCode::ValidationError
        );

        let wrong_add_on = BatchRowInput {
            distance: distances[0].id.to_string(),
            add_ons: vec![add_ons[1].id.to_string()],
            ..BatchRowInput::default()
        };
        assert!(resolve_row(&wrong_add_on, &distances, &add_ons).is_err());
    }
}
