/*!
`Store` methods for students.
*/
use tokio_postgres::Row;

use super::{is_unique_violation, DbError, Filter, Store};
use crate::{
    page::Page,
    phone,
    student::{
        generate_matricule, NewStudent, Student, StudentBrief,
        StudentFilter, StudentUpdate,
    },
};

/// How many fresh matricules to try before giving up on an insert.
const MATRICULE_ATTEMPTS: usize = 10;

fn student_from_row(row: &Row) -> Result<Student, DbError> {
    let sex_str: &str = row.try_get("sex")?;
    let class_str: &str = row.try_get("class")?;

    Ok(Student {
        id: row.try_get("id")?,
        matricule: row.try_get("matricule")?,
        last_name: row.try_get("last_name")?,
        first_names: row.try_get("first_names")?,
        birth_date: row.try_get("birth_date")?,
        sex: sex_str.parse()?,
        class: class_str.parse()?,
        parent_phone: row.try_get("parent_phone")?,
        address: row.try_get("address")?,
        school_year: row.try_get("school_year")?,
        enrolled: row.try_get("enrolled")?,
        enrollment_date: row.try_get("enrollment_date")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
    })
}

/// Columns to select to get a joined `StudentBrief` out of a row with
/// `brief_from_row()`; the students table must be aliased `s`.
pub(super) const BRIEF_COLUMNS: &str = "s.id AS s_id, s.matricule AS s_matricule,
    s.last_name AS s_last_name, s.first_names AS s_first_names, s.class AS s_class";

/// The joined student, or `None` if the join came up empty.
pub(super) fn brief_from_row(row: &Row) -> Result<Option<StudentBrief>, DbError> {
    let id: Option<i64> = row.try_get("s_id")?;
    let id = match id {
        Some(id) => id,
        None => { return Ok(None); },
    };

    let class_str: &str = row.try_get("s_class")?;
    Ok(Some(StudentBrief {
        id,
        matricule: row.try_get("s_matricule")?,
        last_name: row.try_get("s_last_name")?,
        first_names: row.try_get("s_first_names")?,
        class: class_str.parse()?,
    }))
}

impl Store {
    /**
    Enroll a new student, generating a matricule.

    `default_year` is used if the request doesn't name a school year.
    Matricules only have three random digits, so collisions happen; a
    colliding insert is retried with a fresh one.
    */
    pub async fn insert_student(
        &self,
        ns: &NewStudent,
        default_year: &str,
    ) -> Result<Student, DbError> {
        log::trace!(
            "Store::insert_student( {:?} {:?}, {:?} ) called.",
            &ns.last_name, &ns.first_names, default_year
        );

        let year = ns.school_year.as_deref().unwrap_or(default_year);
        let parent_phone = ns.parent_phone.as_deref().map(phone::normalize);
        let client = self.connect().await?;

        for attempt in 1..=MATRICULE_ATTEMPTS {
            let matricule = generate_matricule(ns.class, year);
            let res = client.query_one(
                "INSERT INTO students (
                    matricule, last_name, first_names, birth_date, sex,
                    class, parent_phone, address, school_year
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *",
                &[
                    &matricule,
                    &ns.last_name.trim(),
                    &ns.first_names.trim(),
                    &ns.birth_date,
                    &ns.sex.to_string(),
                    &ns.class.to_string(),
                    &parent_phone,
                    &ns.address,
                    &year,
                ]
            ).await;

            match res {
                Ok(row) => { return student_from_row(&row); },
                Err(e) if is_unique_violation(&e) => {
                    log::debug!(
                        "Matricule {} already taken (attempt {}); retrying.",
                        &matricule, attempt
                    );
                },
                Err(e) => {
                    return Err(DbError::from(e).annotate("Error inserting student"));
                },
            }
        }

        Err(DbError(format!(
            "Unable to generate an unused matricule for {} {} after {} attempts.",
            ns.class, year, MATRICULE_ATTEMPTS
        )))
    }

    pub async fn get_student(&self, id: i64) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE id = $1",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(student_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// One page of enrolled students matching `filter`, newest first, and
    /// the total number of matches.
    pub async fn get_students(
        &self,
        filter: &StudentFilter,
        page: Page,
    ) -> Result<(Vec<Student>, i64), DbError> {
        log::trace!("Store::get_students( {:?}, {:?} ) called.", filter, &page);

        let mut f = Filter::new();
        f.fixed("s.enrolled");
        f.push_opt("s.class = $?", filter.class.map(|c| c.to_string()));
        f.push_opt("s.school_year = $?", filter.school_year.clone());
        f.push_opt(
            "(s.last_name ILIKE $? OR s.first_names ILIKE $? OR s.matricule ILIKE $?)",
            filter.search_pattern()
        );
        let where_clause = f.where_clause();
        let params = f.params();

        let client = self.connect().await?;
        let count_stmt = format!("SELECT COUNT(*) FROM students s{}", &where_clause);
        let select_stmt = format!(
            "SELECT s.* FROM students s{} ORDER BY s.enrollment_date DESC, s.id DESC LIMIT {} OFFSET {}",
            &where_clause, page.limit, page.offset()
        );

        let (count_res, rows_res) = tokio::join!(
            client.query_one(count_stmt.as_str(), &params),
            client.query(select_stmt.as_str(), &params),
        );
        let total: i64 = count_res?.try_get(0)?;
        let students = rows_res?.iter()
            .map(student_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((students, total))
    }

    /// Apply `upd`; fields it leaves `None` keep their values. Returns
    /// `None` if there's no such student.
    pub async fn update_student(
        &self,
        id: i64,
        upd: &StudentUpdate,
    ) -> Result<Option<Student>, DbError> {
        log::trace!("Store::update_student( {}, {:?} ) called.", id, upd);

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE students SET
                class = COALESCE($2, class),
                parent_phone = COALESCE($3, parent_phone),
                address = COALESCE($4, address),
                school_year = COALESCE($5, school_year),
                modified = now()
            WHERE id = $1
            RETURNING *",
            &[
                &id,
                &upd.class.map(|c| c.to_string()),
                &upd.parent_phone.as_deref().map(phone::normalize),
                &upd.address,
                &upd.school_year,
            ]
        ).await? {
            Some(row) => Ok(Some(student_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Mark a student as no longer enrolled. The record itself stays.
    pub async fn withdraw_student(&self, id: i64) -> Result<Option<Student>, DbError> {
        log::trace!("Store::withdraw_student( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE students SET enrolled = FALSE, modified = now()
                WHERE id = $1
                RETURNING *",
            &[&id]
        ).await? {
            Some(row) => Ok(Some(student_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{fresh_store, insert_sample_student, new_student};
    use crate::student::ClassLevel;

    use serial_test::serial;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn enroll_list_update_withdraw() {
        let db = fresh_store().await;

        let kaba = insert_sample_student(&db, "Kaba", ClassLevel::Troisieme).await;
        assert!(kaba.matricule.starts_with("202410"));
        assert_eq!(kaba.school_year, "2024-2025");
        assert!(kaba.enrolled);
        assert_eq!(kaba.parent_phone.as_deref(), Some("62000001"));

        let mut ns = new_student("Touré", ClassLevel::Seconde);
        ns.school_year = Some("2025-2026".to_owned());
        let toure = db.insert_student(&ns, "2024-2025").await.unwrap();
        assert!(toure.matricule.starts_with("202511"));

        for n in 0..5 {
            insert_sample_student(&db, &format!("Sylla{}", n), ClassLevel::Cm1).await;
        }

        let (all, total) = db.get_students(&StudentFilter::default(), Page::default())
            .await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(all.len(), 7);
        // Newest first.
        assert_eq!(all[0].last_name, "Sylla4");

        let f = StudentFilter { class: Some(ClassLevel::Cm1), ..Default::default() };
        let (cm1, total) = db.get_students(&f, Page { page: 2, limit: 2 }).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(cm1.len(), 2);

        let f = StudentFilter { search: Some("tour".to_owned()), ..Default::default() };
        let (found, _) = db.get_students(&f, Page::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, toure.id);

        let f = StudentFilter { search: Some(kaba.matricule.clone()), ..Default::default() };
        let (found, _) = db.get_students(&f, Page::default()).await.unwrap();
        assert_eq!(found[0].id, kaba.id);

        let upd = StudentUpdate {
            class: Some(ClassLevel::Seconde),
            address: Some("Ratoma".to_owned()),
            ..Default::default()
        };
        let kaba2 = db.update_student(kaba.id, &upd).await.unwrap().unwrap();
        assert_eq!(kaba2.class, ClassLevel::Seconde);
        assert_eq!(kaba2.address.as_deref(), Some("Ratoma"));
        assert_eq!(kaba2.parent_phone, kaba.parent_phone);
        assert!(db.update_student(-1, &upd).await.unwrap().is_none());

        let gone = db.withdraw_student(kaba.id).await.unwrap().unwrap();
        assert!(!gone.enrolled);
        let (_, total) = db.get_students(&StudentFilter::default(), Page::default())
            .await.unwrap();
        assert_eq!(total, 6);
        // Still retrievable directly.
        assert!(db.get_student(kaba.id).await.unwrap().is_some());

        db.nuke_database().await.unwrap();
    }
}
