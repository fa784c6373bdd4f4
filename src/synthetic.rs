use rand::Rng;

use crate::table::{Column, Table};

pub const SYNTHETIC_ROWS: usize = 100;

pub const SPECIALTIES: [&str; 5] = [
    "Cardiology",
    "Neurology",
    "Pediatrics",
    "Oncology",
    "Family Medicine",
];

pub const REGIONS: [&str; 4] = ["Northeast", "Midwest", "South", "West"];

/// Stand-in population used when no dataset file is available. Column names
/// follow the spreadsheet export the service was built around.
pub fn synthetic_table<R: Rng + ?Sized>(rows: usize, rng: &mut R) -> anyhow::Result<Table> {
    let npi = (1..=rows).map(|i| format!("NPI{i}"));
    let specialty: Vec<&str> = (0..rows)
        .map(|_| SPECIALTIES[rng.random_range(0..SPECIALTIES.len())])
        .collect();
    let region: Vec<&str> = (0..rows)
        .map(|_| REGIONS[rng.random_range(0..REGIONS.len())])
        .collect();
    let login: Vec<String> = (0..rows)
        .map(|_| {
            let hour: u8 = rng.random_range(6..22);
            let minute: u8 = rng.random_range(0..60);
            format!("{hour:02}:{minute:02}")
        })
        .collect();
    let time_spent: Vec<i64> = (0..rows).map(|_| rng.random_range(5..61)).collect();
    let attempts: Vec<i64> = (0..rows).map(|_| rng.random_range(1..10)).collect();

    Table::new(vec![
        Column::text("NPI", npi),
        Column::text("Speciality", specialty),
        Column::text("Region", region),
        Column::text("Login Time", login),
        Column::integers("Time Spent", time_spent),
        Column::integers("Count of Attempts", attempts),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn builds_requested_rows_with_known_columns() {
        let mut rng = StdRng::seed_from_u64(7);
        let table = synthetic_table(SYNTHETIC_ROWS, &mut rng).unwrap();
        assert_eq!(table.len(), 100);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec![
                "NPI",
                "Speciality",
                "Region",
                "Login Time",
                "Time Spent",
                "Count of Attempts"
            ]
        );
        let npi = table.column("NPI").unwrap();
        assert_eq!(npi.values[0].as_deref(), Some("NPI1"));
        assert_eq!(npi.values[99].as_deref(), Some("NPI100"));
    }

    #[test]
    fn values_stay_in_candidate_ranges() {
        let mut rng = StdRng::seed_from_u64(11);
        let table = synthetic_table(250, &mut rng).unwrap();

        for v in table.column("Speciality").unwrap().values.iter().flatten() {
            assert!(SPECIALTIES.contains(&v.as_str()));
        }
        for v in table.column("Region").unwrap().values.iter().flatten() {
            assert!(REGIONS.contains(&v.as_str()));
        }
        for v in table.column("Login Time").unwrap().values.iter().flatten() {
            let (h, m) = v.split_once(':').unwrap();
            let h: u8 = h.parse().unwrap();
            let m: u8 = m.parse().unwrap();
            assert!((6..22).contains(&h));
            assert!(m < 60);
        }
        for v in table.column("Time Spent").unwrap().numeric_values() {
            assert!((5.0..61.0).contains(&v.unwrap()));
        }
        for v in table.column("Count of Attempts").unwrap().numeric_values() {
            assert!((1.0..10.0).contains(&v.unwrap()));
        }
    }

    #[test]
    fn same_seed_same_table() {
        let a = synthetic_table(20, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = synthetic_table(20, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }
}
