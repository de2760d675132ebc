//! Group composition (owned by the enrollment collaborator)

use diesel::prelude::*;

use super::diesel_schema::group_members;
use super::models::NewGroupMember;
use crate::error::ProgressionError;

/// Member learner IDs of a group, sorted
pub fn member_ids(
    conn: &mut SqliteConnection,
    group_id: &str,
) -> Result<Vec<String>, ProgressionError> {
    group_members::table
        .filter(group_members::group_id.eq(group_id))
        .order(group_members::learner_id.asc())
        .select(group_members::learner_id)
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Groups with at least one member
pub fn group_ids(conn: &mut SqliteConnection) -> Result<Vec<String>, ProgressionError> {
    group_members::table
        .select(group_members::group_id)
        .distinct()
        .order(group_members::group_id.asc())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Add a learner to a group; adding twice is a no-op
pub fn add_member(
    conn: &mut SqliteConnection,
    group_id: &str,
    learner_id: &str,
) -> Result<(), ProgressionError> {
    diesel::insert_into(group_members::table)
        .values(&NewGroupMember { group_id, learner_id })
        .on_conflict_do_nothing()
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("member '{}'", learner_id)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_db;

    #[test]
    fn test_membership() {
        let mut conn = setup_test_db();
        add_member(&mut conn, "g1", "bob").unwrap();
        add_member(&mut conn, "g1", "alice").unwrap();
        add_member(&mut conn, "g1", "alice").unwrap();
        add_member(&mut conn, "g2", "carol").unwrap();

        assert_eq!(member_ids(&mut conn, "g1").unwrap(), vec!["alice", "bob"]);
        assert!(member_ids(&mut conn, "empty").unwrap().is_empty());
        assert_eq!(group_ids(&mut conn).unwrap(), vec!["g1", "g2"]);
    }
}
