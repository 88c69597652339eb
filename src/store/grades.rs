/*!
`Store` methods for subjects and grades.
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::ToSql};

use super::{DbError, Store};
use crate::grade::{Grade, NewGrade, Subject, Term};

fn subject_from_row(row: &Row) -> Result<Subject, DbError> {
    Ok(Subject {
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        coefficient: row.try_get("coefficient")?,
    })
}

fn grade_from_row(row: &Row) -> Result<Grade, DbError> {
    let term_str: &str = row.try_get("term")?;
    Ok(Grade {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        term: term_str.parse()?,
        score: row.try_get("score")?,
        recorded_by: row.try_get("recorded_by")?,
        created: row.try_get("created")?,
    })
}

impl Store {
    /// Insert any of `subjects` not already present (by code). Existing
    /// subjects are left alone. Returns how many were inserted.
    pub async fn ensure_subjects(&self, subjects: &[Subject]) -> Result<usize, DbError> {
        log::trace!("Store::ensure_subjects( [ {} subjects ] ) called.", subjects.len());

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        let insert_stmt = t.prepare(
            "INSERT INTO subjects (code, name, coefficient) VALUES ($1, $2, $3)
                ON CONFLICT (code) DO NOTHING"
        ).await?;

        let pvec: Vec<[&(dyn ToSql + Sync); 3]> = subjects.iter()
            .map(|s| {
                let p: [&(dyn ToSql + Sync); 3] = [&s.code, &s.name, &s.coefficient];
                p
            }).collect();

        let mut n_inserted: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_stmt, params));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(n) => { n_inserted += n; },
                    Err(e) => {
                        return Err(DbError::from(e).annotate("Error inserting subject"));
                    },
                }
            }
        }

        t.commit().await?;
        if n_inserted > 0 {
            log::info!("Inserted {} subjects.", n_inserted);
        }
        Ok(n_inserted as usize)
    }

    pub async fn get_subjects(&self) -> Result<Vec<Subject>, DbError> {
        log::trace!("Store::get_subjects() called.");

        let client = self.connect().await?;
        client.query(
            "SELECT * FROM subjects ORDER BY coefficient DESC, code",
            &[]
        ).await?
            .iter()
            .map(subject_from_row)
            .collect()
    }

    /// The caller should check the student and subject exist.
    pub async fn insert_grade(
        &self,
        ng: &NewGrade,
        recorded_by: i64,
    ) -> Result<Grade, DbError> {
        log::trace!(
            "Store::insert_grade( student {}, {:?}, {}, {} ) called.",
            ng.student_id, &ng.subject, &ng.term, ng.score
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO grades (student_id, subject, term, score, recorded_by)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *",
            &[
                &ng.student_id,
                &ng.subject,
                &ng.term.to_string(),
                &ng.score,
                &recorded_by,
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting grade"))?;

        grade_from_row(&row)
    }

    /// A student's grades, optionally only for one `term`, oldest first.
    pub async fn get_grades(
        &self,
        student_id: i64,
        term: Option<Term>,
    ) -> Result<Vec<Grade>, DbError> {
        log::trace!("Store::get_grades( {}, {:?} ) called.", student_id, &term);

        let client = self.connect().await?;
        let rows = match term {
            Some(term) => client.query(
                "SELECT * FROM grades WHERE student_id = $1 AND term = $2
                    ORDER BY created, id",
                &[&student_id, &term.to_string()]
            ).await?,
            None => client.query(
                "SELECT * FROM grades WHERE student_id = $1
                    ORDER BY term, created, id",
                &[&student_id]
            ).await?,
        };

        rows.iter().map(grade_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::{default_subjects, report_card};
    use crate::store::tests::{fresh_store, insert_sample_student};
    use crate::student::ClassLevel;

    use float_cmp::approx_eq;
    use serial_test::serial;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn subjects_and_grades() {
        let db = fresh_store().await;

        let subjects = default_subjects();
        assert_eq!(db.ensure_subjects(&subjects).await.unwrap(), subjects.len());
        assert_eq!(db.ensure_subjects(&subjects).await.unwrap(), 0);
        let stored = db.get_subjects().await.unwrap();
        assert_eq!(stored.len(), subjects.len());
        assert_eq!(stored[0].coefficient, 3.0);

        let s = insert_sample_student(&db, "Diallo", ClassLevel::Premiere).await;
        for (subject, term, score) in [
            ("MATH", Term::T1, 12.0_f32),
            ("MATH", Term::T1, 14.0),
            ("FR", Term::T1, 10.0),
            ("FR", Term::T2, 18.0),
        ] {
            let ng = NewGrade { student_id: s.id, subject: subject.to_owned(), term, score };
            db.insert_grade(&ng, 1).await.unwrap();
        }

        let t1 = db.get_grades(s.id, Some(Term::T1)).await.unwrap();
        assert_eq!(t1.len(), 3);
        assert_eq!(db.get_grades(s.id, None).await.unwrap().len(), 4);

        let rc = report_card(s.id, Term::T1, &t1, &stored);
        // (13 * 3 + 10 * 3) / 6
        assert!(approx_eq!(f32, rc.overall.unwrap(), 11.5));

        db.nuke_database().await.unwrap();
    }
}
