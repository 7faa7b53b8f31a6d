// Rotation - who pays the next round
//
// The rotation follows the group's member sequence. Whoever paid the
// latest round is located in that sequence and the turn passes to the
// next slot, wrapping at the end. A payer who is not (or no longer) in
// the sequence restarts the rotation at slot 0.

use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::entities::{Member, Round};
use crate::error::{Error, Result};

/// Latest round of an in-memory history.
///
/// Latest means greatest date; rounds sharing a date are ordered by id,
/// so the one inserted last wins.
pub fn latest_round(rounds: &[Round]) -> Option<&Round> {
    rounds.iter().max_by_key(|r| r.recency_key())
}

/// Pick the member whose turn it is, given the latest round (if any).
pub fn next_payer<'a>(members: &'a [Member], last_round: Option<&Round>) -> Result<&'a Member> {
    if members.is_empty() {
        return Err(Error::NoMembers);
    }

    let index = match last_round {
        None => 0,
        Some(round) => members
            .iter()
            .position(|m| m.user.id == round.paid_by_id)
            .map_or(0, |last| (last + 1) % members.len()),
    };

    Ok(&members[index])
}

/// Store-backed resolution of the next payer for a group
pub struct RotationResolver;

impl RotationResolver {
    /// Next payer of `group_id`.
    ///
    /// Both reads run inside one transaction so the member sequence and the
    /// latest round come from the same snapshot.
    pub fn resolve(conn: &Connection, group_id: i64) -> Result<Member> {
        let tx = conn.unchecked_transaction()?;

        if !db::group_exists(&tx, group_id)? {
            return Err(Error::not_found("Group"));
        }

        let members = db::get_members(&tx, group_id)?;
        let last_round = db::get_last_round(&tx, group_id)?;
        tx.commit()?;

        let next = next_payer(&members, last_round.as_ref())?;
        debug!(
            group_id,
            last_payer = last_round.as_ref().map(|r| r.paid_by_id),
            next_payer = next.user.id,
            "next payer resolved"
        );

        Ok(next.clone())
    }

    /// The next `count` payers, assuming each one pays in turn
    pub fn upcoming(conn: &Connection, group_id: i64, count: usize) -> Result<Vec<Member>> {
        let first = Self::resolve(conn, group_id)?;
        let members = db::get_members(conn, group_id)?;

        Ok(members
            .iter()
            .cycle()
            .skip(first.position)
            .take(count)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_member, insert_group, insert_round, insert_round_at, insert_user, setup_database};
    use crate::entities::{NewGroup, NewRound, NewUser, User};
    use chrono::{Duration, TimeZone, Utc};

    fn member(position: usize, id: i64) -> Member {
        Member {
            position,
            user: User {
                id,
                email: format!("user{}@example.com", id),
                username: format!("user{}", id),
                hashed_password: String::new(),
                is_active: true,
                created_at: Utc::now(),
            },
        }
    }

    fn members(ids: &[i64]) -> Vec<Member> {
        ids.iter().enumerate().map(|(i, id)| member(i, *id)).collect()
    }

    fn round(id: i64, paid_by_id: i64, minutes: i64) -> Round {
        Round {
            id,
            group_id: 1,
            paid_by_id,
            amount: 0,
            date: Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap() + Duration::minutes(minutes),
            notes: None,
        }
    }

    // ------------------------------------------------------------------
    // Pure algorithm
    // ------------------------------------------------------------------

    #[test]
    fn test_no_rounds_starts_at_first_member() {
        for n in 1..=6 {
            let ids: Vec<i64> = (1..=n).map(|i| i * 10).collect();
            let group = members(&ids);
            assert_eq!(next_payer(&group, None).unwrap().user.id, 10);
        }
    }

    #[test]
    fn test_advances_to_next_position_and_wraps() {
        let group = members(&[1, 2, 3]);

        assert_eq!(next_payer(&group, Some(&round(1, 1, 0))).unwrap().user.id, 2);
        assert_eq!(next_payer(&group, Some(&round(2, 2, 1))).unwrap().user.id, 3);
        assert_eq!(next_payer(&group, Some(&round(3, 3, 2))).unwrap().user.id, 1);
    }

    #[test]
    fn test_single_member_always_pays() {
        let group = members(&[7]);
        assert_eq!(next_payer(&group, Some(&round(1, 7, 0))).unwrap().user.id, 7);
    }

    #[test]
    fn test_unknown_payer_restarts_rotation() {
        let group = members(&[1, 2]);
        let stranger = round(1, 99, 0);

        assert_eq!(next_payer(&group, Some(&stranger)).unwrap().user.id, 1);
    }

    #[test]
    fn test_empty_group_has_no_payer() {
        let err = next_payer(&[], None).unwrap_err();
        assert!(matches!(err, Error::NoMembers));

        let err = next_payer(&[], Some(&round(1, 1, 0))).unwrap_err();
        assert!(matches!(err, Error::NoMembers));
    }

    #[test]
    fn test_latest_round_uses_date_then_id() {
        assert!(latest_round(&[]).is_none());

        // Out of order on purpose
        let history = vec![round(3, 1, 5), round(1, 2, 10), round(2, 3, 10)];
        assert_eq!(latest_round(&history).unwrap().id, 2);
    }

    #[test]
    fn test_rotation_visits_every_member_once_per_cycle() {
        for n in 1..=6usize {
            let ids: Vec<i64> = (1..=n as i64).collect();
            let group = members(&ids);
            let mut history: Vec<Round> = Vec::new();
            let mut payers = Vec::new();

            for step in 0..(3 * n) {
                let payer = next_payer(&group, latest_round(&history)).unwrap().user.id;
                payers.push(payer);
                history.push(round(step as i64 + 1, payer, step as i64));
            }

            for cycle in payers.chunks(n) {
                assert_eq!(cycle, ids.as_slice(), "cycle of {} members", n);
            }
        }
    }

    // ------------------------------------------------------------------
    // Store-backed resolution
    // ------------------------------------------------------------------

    fn setup_group(names: &[&str]) -> (Connection, i64, Vec<User>) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let users: Vec<User> = names
            .iter()
            .map(|name| {
                let new_user = NewUser::new(&format!("{}@example.com", name), name, "pw");
                insert_user(&conn, &new_user, "hash").unwrap()
            })
            .collect();

        let creator = users.first().map(|u| u.id).unwrap_or_else(|| {
            insert_user(&conn, &NewUser::new("owner@example.com", "owner", "pw"), "hash")
                .unwrap()
                .id
        });
        let group = insert_group(&conn, &NewGroup::new("Friday", creator)).unwrap();

        for user in &users {
            add_member(&conn, group.id, user.id).unwrap();
        }

        (conn, group.id, users)
    }

    fn pay(conn: &Connection, group_id: i64, user_id: i64) {
        insert_round(conn, &NewRound::new(group_id, user_id, 0, Some("Round paid".to_string()))).unwrap();
    }

    #[test]
    fn test_resolve_walks_the_example_rotation() {
        let (conn, group_id, users) = setup_group(&["a", "b", "c"]);
        let (a, b, c) = (&users[0], &users[1], &users[2]);

        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, a.id);
        pay(&conn, group_id, a.id);
        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, b.id);
        pay(&conn, group_id, b.id);
        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, c.id);
        pay(&conn, group_id, c.id);
        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, a.id);
    }

    #[test]
    fn test_resolve_payer_outside_group_falls_back_to_first() {
        let (conn, group_id, users) = setup_group(&["a", "b"]);
        let outsider = insert_user(&conn, &NewUser::new("x@example.com", "x", "pw"), "hash").unwrap();

        pay(&conn, group_id, outsider.id);

        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, users[0].id);
    }

    #[test]
    fn test_resolve_breaks_timestamp_ties_by_insertion() {
        let (conn, group_id, users) = setup_group(&["a", "b", "c"]);
        let at = Utc.with_ymd_and_hms(2024, 3, 8, 21, 30, 0).unwrap();

        insert_round_at(&conn, &NewRound::new(group_id, users[2].id, 0, None), at).unwrap();
        insert_round_at(&conn, &NewRound::new(group_id, users[0].id, 0, None), at).unwrap();

        // users[0] was inserted last, so users[1] is up
        assert_eq!(RotationResolver::resolve(&conn, group_id).unwrap().user.id, users[1].id);
    }

    #[test]
    fn test_resolve_errors() {
        let (conn, group_id, _) = setup_group(&[]);

        assert!(matches!(
            RotationResolver::resolve(&conn, group_id).unwrap_err(),
            Error::NoMembers
        ));
        assert!(matches!(
            RotationResolver::resolve(&conn, group_id + 1).unwrap_err(),
            Error::NotFound { entity: "Group" }
        ));
    }

    #[test]
    fn test_upcoming_lists_turns_in_order() {
        let (conn, group_id, users) = setup_group(&["a", "b", "c"]);
        pay(&conn, group_id, users[0].id);

        let order: Vec<i64> = RotationResolver::upcoming(&conn, group_id, 5)
            .unwrap()
            .iter()
            .map(|m| m.user.id)
            .collect();

        assert_eq!(order, vec![users[1].id, users[2].id, users[0].id, users[1].id, users[2].id]);
    }
}
