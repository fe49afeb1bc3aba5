use crate::bbox::BBox;
use crate::error::Result;
use serde_json::Value;
use std::path::Path;

const LEADING_COLUMNS: [&str; 5] = ["x", "y", "width", "height", "label"];

/// Export boxes to CSV.
///
/// Headers are `x,y,width,height,label` followed by every other field name in
/// the order it first appears. Missing fields are left empty.
pub fn export_csv<'a>(
    rows: impl IntoIterator<Item = &'a BBox>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let rows: Vec<&BBox> = rows.into_iter().collect();
    let mut headers: Vec<&str> = LEADING_COLUMNS.to_vec();
    for b in &rows {
        for (name, _) in b.fields() {
            if !headers.contains(&name) {
                headers.push(name);
            }
        }
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&headers)?;
    for b in &rows {
        wtr.write_record(headers.iter().map(|h| cell(b.get(h))))?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn export_csv_writes_geometry_first_then_extra_fields() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bboxes.csv");
        let rows = vec![
            BBox::new(0.0, 0.0, 10.0, 10.0)
                .with_label("apple")
                .with_field("note", "bruised"),
            BBox::new(1.5, 2.0, 3.0, 4.0).with_field("occluded", true),
            BBox::default().with_field("image", "fruit2.jpg"),
        ];

        export_csv(&rows, &path)?;

        let mut rdr = csv::Reader::from_path(&path)?;
        let headers = rdr.headers()?.clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["x", "y", "width", "height", "label", "note", "occluded", "image"]
        );

        let mut recs = rdr.records();
        let r1 = recs.next().unwrap()?;
        assert_eq!(&r1[0], "0.0");
        assert_eq!(&r1[4], "apple");
        assert_eq!(&r1[5], "bruised");
        assert_eq!(&r1[6], "");

        let r2 = recs.next().unwrap()?;
        assert_eq!(&r2[0], "1.5");
        assert_eq!(&r2[4], "");
        assert_eq!(&r2[6], "true");

        let r3 = recs.next().unwrap()?;
        assert_eq!(&r3[0], "");
        assert_eq!(&r3[7], "fruit2.jpg");

        assert!(recs.next().is_none());
        Ok(())
    }

    #[test]
    fn export_csv_empty_writes_header_only() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        export_csv(&Vec::new(), &path)?;

        let mut rdr = csv::Reader::from_path(&path)?;
        assert_eq!(rdr.headers()?.len(), 5);
        assert!(rdr.records().next().is_none());
        Ok(())
    }
}
