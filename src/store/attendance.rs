/*!
`Store` methods for attendance records.
*/
use futures::stream::{FuturesUnordered, StreamExt};
use time::Date;
use tokio_postgres::{Row, types::ToSql};

use super::{
    is_unique_violation,
    students::{brief_from_row, BRIEF_COLUMNS},
    DbError, Filter, Store,
};
use crate::{
    attendance::{Attendance, AttendanceFilter, NewAttendance, RollCall},
    page::Page,
};

/// Reasons a roll call is refused as a whole.
#[derive(Debug, PartialEq, Eq)]
pub enum RollOutcome {
    Inserted(usize),
    /// These student ids don't exist.
    UnknownStudents(Vec<i64>),
    /// These students already have a record for that day and subject.
    AlreadyRecorded(Vec<i64>),
}

fn attendance_from_row(row: &Row) -> Result<Attendance, DbError> {
    Ok(Attendance {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        day: row.try_get("day")?,
        subject: row.try_get("subject")?,
        present: row.try_get("present")?,
        absence_reason: row.try_get("absence_reason")?,
        recorded_by: row.try_get("recorded_by")?,
        created: row.try_get("created")?,
        student: None,
    })
}

impl Store {
    /**
    Record one student's attendance on `day`.

    Returns `None` if that student already has a record for that day and
    subject. The caller should check the student exists.
    */
    pub async fn insert_attendance(
        &self,
        na: &NewAttendance,
        day: Date,
        recorded_by: i64,
    ) -> Result<Option<Attendance>, DbError> {
        log::trace!(
            "Store::insert_attendance( student {}, {}, {:?}, {} ) called.",
            na.student_id, &day, &na.subject, na.present
        );

        let client = self.connect().await?;
        let res = client.query_one(
            "INSERT INTO attendance (
                student_id, day, subject, present, absence_reason, recorded_by
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
            &[
                &na.student_id,
                &day,
                &na.subject.trim(),
                &na.present,
                &na.absence_reason,
                &recorded_by,
            ]
        ).await;

        match res {
            Ok(row) => Ok(Some(attendance_from_row(&row)?)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(DbError::from(e).annotate("Error inserting attendance")),
        }
    }

    /**
    Record a whole roll call in one transaction.

    Either every entry goes in or none does: unknown students and
    already-recorded students are checked for up front and reported.
    */
    pub async fn insert_roll_call(
        &self,
        rc: &RollCall,
        day: Date,
        recorded_by: i64,
    ) -> Result<RollOutcome, DbError> {
        log::trace!(
            "Store::insert_roll_call( {:?}, {}, [ {} entries ], {} ) called.",
            &rc.subject, &day, rc.entries.len(), recorded_by
        );

        let subject = rc.subject.trim();
        let ids: Vec<i64> = rc.entries.iter().map(|e| e.student_id).collect();

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e).annotate("Unable to begin transaction"))?;

        let known_params: [&(dyn ToSql + Sync); 1] = [&ids];
        let dup_params: [&(dyn ToSql + Sync); 3] = [&day, &subject, &ids];

        let (known_res, dup_res) = tokio::join!(
            t.query("SELECT id FROM students WHERE id = ANY($1)", &known_params[..]),
            t.query(
                "SELECT student_id FROM attendance
                    WHERE day = $1 AND subject = $2 AND student_id = ANY($3)",
                &dup_params[..]
            ),
        );

        let known: Vec<i64> = known_res?.iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()?;
        let unknown: Vec<i64> = ids.iter()
            .filter(|id| !known.contains(id))
            .copied()
            .collect();
        if !unknown.is_empty() {
            return Ok(RollOutcome::UnknownStudents(unknown));
        }

        let mut dups: Vec<i64> = dup_res?.iter()
            .map(|row| row.try_get("student_id"))
            .collect::<Result<_, _>>()?;
        if !dups.is_empty() {
            dups.sort_unstable();
            return Ok(RollOutcome::AlreadyRecorded(dups));
        }

        let insert_stmt = t.prepare(
            "INSERT INTO attendance (
                student_id, day, subject, present, absence_reason, recorded_by
            ) VALUES ($1, $2, $3, $4, $5, $6)"
        ).await?;

        // The parameter arrays have to outlive the futures borrowing them.
        let pvec: Vec<[&(dyn ToSql + Sync); 6]> = rc.entries.iter()
            .map(|e| {
                let p: [&(dyn ToSql + Sync); 6] = [
                    &e.student_id, &day, &subject,
                    &e.present, &e.absence_reason, &recorded_by,
                ];
                p
            }).collect();

        // Entries recorded after the check above (or listed twice) only
        // show up here, as unique violations.
        let mut n_inserted: u64 = 0;
        let mut dups: Vec<i64> = Vec::new();
        let mut first_err: Option<tokio_postgres::Error> = None;
        {
            let mut inserts = FuturesUnordered::new();
            for (e, params) in rc.entries.iter().zip(pvec.iter()) {
                let student_id = e.student_id;
                let insert = t.execute(&insert_stmt, params);
                inserts.push(async move { (student_id, insert.await) });
            }

            while let Some((student_id, res)) = inserts.next().await {
                match res {
                    Ok(n) => { n_inserted += n; },
                    Err(e) if is_unique_violation(&e) => { dups.push(student_id); },
                    Err(e) => {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    },
                }
            }
        }

        if !dups.is_empty() {
            dups.sort_unstable();
            dups.dedup();
            log::warn!(
                "Roll call for {:?} on {} collided with existing records: {:?}",
                subject, &day, &dups
            );
            return Ok(RollOutcome::AlreadyRecorded(dups));
        }
        if let Some(e) = first_err {
            return Err(DbError::from(e).annotate("Error inserting roll call entry"));
        }

        t.commit().await
            .map_err(|e| DbError::from(e).annotate("Error committing transaction"))?;

        log::info!(
            "Recorded {} attendance entries for {:?} on {}.",
            n_inserted, subject, &day
        );
        Ok(RollOutcome::Inserted(n_inserted as usize))
    }

    /// One page of records matching `filter`, latest day first, and the
    /// total number of matches.
    pub async fn get_attendance(
        &self,
        filter: &AttendanceFilter,
        page: Page,
    ) -> Result<(Vec<Attendance>, i64), DbError> {
        log::trace!("Store::get_attendance( {:?}, {:?} ) called.", filter, &page);

        let mut f = Filter::new();
        f.push_opt("a.student_id = $?", filter.student_id);
        f.push_opt("a.day >= $?", filter.from);
        f.push_opt("a.day <= $?", filter.to);
        f.push_opt("a.subject = $?", filter.subject.clone());
        if filter.absences_only {
            f.fixed("NOT a.present");
        }
        let where_clause = f.where_clause();
        let params = f.params();

        let client = self.connect().await?;
        let count_stmt = format!("SELECT COUNT(*) FROM attendance a{}", &where_clause);
        let select_stmt = format!(
            "SELECT a.*, {} FROM attendance a
                LEFT JOIN students s ON s.id = a.student_id
                {}
                ORDER BY a.day DESC, a.id DESC LIMIT {} OFFSET {}",
            BRIEF_COLUMNS, &where_clause, page.limit, page.offset()
        );

        let (count_res, rows_res) = tokio::join!(
            client.query_one(count_stmt.as_str(), &params),
            client.query(select_stmt.as_str(), &params),
        );
        let total: i64 = count_res?.try_get(0)?;

        let mut records = Vec::new();
        for row in rows_res?.iter() {
            let mut a = attendance_from_row(row)?;
            a.student = brief_from_row(row)?;
            records.push(a);
        }

        Ok((records, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::RollEntry;
    use crate::store::tests::{fresh_store, insert_sample_student};
    use crate::student::ClassLevel;

    use serial_test::serial;
    use time::macros::date;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn single_records_and_duplicates() {
        let db = fresh_store().await;
        let s = insert_sample_student(&db, "Condé", ClassLevel::Cm1).await;
        let day = date!(2024 - 10 - 07);

        let na = NewAttendance {
            student_id: s.id,
            day: None,
            subject: "MATH".to_owned(),
            present: false,
            absence_reason: Some("malade".to_owned()),
        };
        let a = db.insert_attendance(&na, day, 1).await.unwrap().unwrap();
        assert!(!a.present);
        assert_eq!(a.day, day);
        assert!(db.insert_attendance(&na, day, 1).await.unwrap().is_none());

        // Different subject is fine.
        let na2 = NewAttendance { subject: "FR".to_owned(), present: true, absence_reason: None, ..na };
        assert!(db.insert_attendance(&na2, day, 1).await.unwrap().is_some());

        let f = AttendanceFilter { absences_only: true, ..Default::default() };
        let (abs, total) = db.get_attendance(&f, Page::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(abs[0].student.as_ref().unwrap().id, s.id);

        let f = AttendanceFilter {
            from: Some(date!(2024 - 10 - 08)),
            ..Default::default()
        };
        assert_eq!(db.get_attendance(&f, Page::default()).await.unwrap().1, 0);
        let f = AttendanceFilter {
            from: Some(day),
            to: Some(day),
            ..Default::default()
        };
        assert_eq!(db.get_attendance(&f, Page::default()).await.unwrap().1, 2);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn roll_calls_are_all_or_nothing() {
        let db = fresh_store().await;
        let a = insert_sample_student(&db, "Keita", ClassLevel::Ce1).await;
        let b = insert_sample_student(&db, "Fofana", ClassLevel::Ce1).await;
        let day = date!(2024 - 10 - 08);

        let entry = |student_id: i64, present: bool| RollEntry {
            student_id,
            present,
            absence_reason: None,
        };

        let rc = RollCall {
            day: Some(day),
            subject: "SVT".to_owned(),
            entries: vec![entry(a.id, true), entry(-5, true)],
        };
        assert_eq!(
            db.insert_roll_call(&rc, day, 1).await.unwrap(),
            RollOutcome::UnknownStudents(vec![-5])
        );

        let rc = RollCall { entries: vec![entry(a.id, true), entry(b.id, false)], ..rc };
        assert_eq!(db.insert_roll_call(&rc, day, 1).await.unwrap(), RollOutcome::Inserted(2));
        assert_eq!(
            db.insert_roll_call(&rc, day, 1).await.unwrap(),
            RollOutcome::AlreadyRecorded(vec![a.id.min(b.id), a.id.max(b.id)])
        );

        let (_, total) = db.get_attendance(&AttendanceFilter::default(), Page::default())
            .await.unwrap();
        assert_eq!(total, 2);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn roll_call_collisions_at_insert_are_refused() {
        let db = fresh_store().await;
        let a = insert_sample_student(&db, "Kourouma", ClassLevel::Ce2).await;
        let b = insert_sample_student(&db, "Sow", ClassLevel::Ce2).await;
        let day = date!(2024 - 10 - 09);

        let entry = |student_id: i64| RollEntry {
            student_id,
            present: true,
            absence_reason: None,
        };

        // Passes the up-front check, then trips the unique index.
        let rc = RollCall {
            day: Some(day),
            subject: "MATH".to_owned(),
            entries: vec![entry(a.id), entry(b.id), entry(a.id)],
        };
        assert_eq!(
            db.insert_roll_call(&rc, day, 1).await.unwrap(),
            RollOutcome::AlreadyRecorded(vec![a.id])
        );

        let (_, total) = db.get_attendance(&AttendanceFilter::default(), Page::default())
            .await.unwrap();
        assert_eq!(total, 0);

        db.nuke_database().await.unwrap();
    }
}
