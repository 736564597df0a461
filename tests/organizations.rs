mod common;

use common::{sample_work, setup};
use goodworks_graph::models::Organization;
use goodworks_graph::AppError;

fn sample_org(name: &str) -> Organization {
    Organization {
        name: name.to_string(),
        description: "Neighborhood charity".to_string(),
        contact_email: "hello@example.org".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn colliding_names_get_suffixed_slugs() {
    let env = setup().await;

    let first = env
        .organizations
        .create(sample_org("River Walk Cleanup"), "user-a")
        .await
        .expect("create");
    let second = env
        .organizations
        .create(sample_org("River Walk Cleanup"), "user-b")
        .await
        .expect("create");

    assert_eq!(first.slug, "river-walk-cleanup");
    assert_eq!(second.slug, "river-walk-cleanup-1");

    assert!(!env
        .organizations
        .is_slug_available("river-walk-cleanup", None)
        .await
        .expect("check"));
    assert!(env
        .organizations
        .is_slug_available("river-walk-cleanup", first.id)
        .await
        .expect("check excluding self"));
}

#[tokio::test]
async fn slug_suffixes_run_out_with_a_conflict() {
    let env = setup().await;

    // The base slug plus suffixes -1 through -50.
    for _ in 0..51 {
        env.organizations
            .create(sample_org("Crowded Name"), "user-a")
            .await
            .expect("create");
    }

    let overflow = env
        .organizations
        .create(sample_org("Crowded Name"), "user-a")
        .await;
    assert!(matches!(overflow, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn creator_becomes_admin_and_counts_derive_from_edges() {
    let env = setup().await;
    let org = env
        .organizations
        .create(sample_org("Helping Hands"), "user-a")
        .await
        .expect("create");
    let org_id = org.id.expect("id");

    env.organizations
        .add_member(org_id, "user-b", "Member")
        .await
        .expect("add member");

    // An event posted under the organization, with one volunteer.
    let mut work = sample_work("Org Drive");
    work.organization_name = Some("Helping Hands".to_string());
    let work_id = env.works.create(&work, "user-a").await.expect("create work");
    env.works
        .set_signed_up("user-c", &work_id.to_string(), true)
        .await
        .expect("sign up");

    let fetched = env
        .organizations
        .get_by_slug("helping-hands", Some("user-b"))
        .await
        .expect("fetch")
        .expect("present");

    assert_eq!(fetched.member_count, 2);
    assert_eq!(fetched.event_count, 1);
    assert_eq!(fetched.volunteer_count, 1);
    assert!(!fetched.is_user_admin);
    assert!(fetched.is_user_member);

    let as_admin = env
        .organizations
        .get_by_slug("helping-hands", Some("user-a"))
        .await
        .expect("fetch")
        .expect("present");
    assert!(as_admin.is_user_admin);
    assert!(as_admin.is_user_member);
}

#[tokio::test]
async fn membership_lifecycle_and_promotion() {
    let env = setup().await;
    let org = env
        .organizations
        .create(sample_org("Trail Keepers"), "user-a")
        .await
        .expect("create");
    let org_id = org.id.expect("id");

    env.organizations
        .add_member(org_id, "user-b", "Member")
        .await
        .expect("add");
    assert!(!env
        .organizations
        .is_user_admin(org_id, "user-b")
        .await
        .expect("check"));

    let members = env.organizations.members(org_id).await.expect("members");
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].role, "Admin");
    assert_eq!(members[0].user_id, "user-a");
    assert_eq!(members[1].role, "Member");

    assert!(env
        .organizations
        .promote_to_admin(org_id, "user-b")
        .await
        .expect("promote"));
    assert!(env
        .organizations
        .is_user_admin(org_id, "user-b")
        .await
        .expect("check"));

    let members = env.organizations.members(org_id).await.expect("members");
    assert!(members.iter().all(|m| m.role == "Admin"));

    // Removing only touches MEMBER_OF; an admin stays.
    assert!(!env
        .organizations
        .remove_member(org_id, "user-b")
        .await
        .expect("remove"));
    assert!(env
        .organizations
        .is_user_admin(org_id, "user-b")
        .await
        .expect("check"));
}

#[tokio::test]
async fn re_adding_a_member_keeps_the_first_role() {
    let env = setup().await;
    let org = env
        .organizations
        .create(sample_org("Food Friends"), "user-a")
        .await
        .expect("create");
    let org_id = org.id.expect("id");

    env.organizations
        .add_member(org_id, "user-b", "Coordinator")
        .await
        .expect("add");
    env.organizations
        .add_member(org_id, "user-b", "Member")
        .await
        .expect("re-add");

    let members = env.organizations.members(org_id).await.expect("members");
    let member = members
        .iter()
        .find(|m| m.user_id == "user-b")
        .expect("present");
    assert_eq!(member.role, "Coordinator");
}

#[tokio::test]
async fn listing_searches_and_soft_delete_hides() {
    let env = setup().await;
    env.organizations
        .create(sample_org("River Keepers"), "user-a")
        .await
        .expect("create");
    let garden = env
        .organizations
        .create(sample_org("Garden Collective"), "user-a")
        .await
        .expect("create");

    assert_eq!(env.organizations.count(None).await.expect("count"), 2);
    assert_eq!(
        env.organizations.count(Some("garden")).await.expect("count"),
        1
    );

    let hits = env
        .organizations
        .list(0, 20, Some("river"))
        .await
        .expect("list");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "River Keepers");

    assert!(env
        .organizations
        .soft_delete(garden.id.expect("id"))
        .await
        .expect("soft delete"));
    assert_eq!(env.organizations.count(None).await.expect("count"), 1);

    // Soft-deleted organizations are still reachable by slug.
    let fetched = env
        .organizations
        .get_by_slug("garden-collective", None)
        .await
        .expect("fetch");
    assert!(fetched.is_some());
}

#[tokio::test]
async fn user_organizations_carry_the_matched_role() {
    let env = setup().await;
    let admin_org = env
        .organizations
        .create(sample_org("Alpha Org"), "user-a")
        .await
        .expect("create");
    let member_org = env
        .organizations
        .create(sample_org("Beta Org"), "user-b")
        .await
        .expect("create");
    env.organizations
        .add_member(member_org.id.expect("id"), "user-a", "Member")
        .await
        .expect("add");

    let orgs = env
        .organizations
        .user_organizations("user-a")
        .await
        .expect("list");
    assert_eq!(orgs.len(), 2);

    let alpha = orgs
        .iter()
        .find(|o| o.id == admin_org.id)
        .expect("alpha present");
    assert!(alpha.is_user_admin);
    let beta = orgs
        .iter()
        .find(|o| o.id == member_org.id)
        .expect("beta present");
    assert!(!beta.is_user_admin);
    assert!(beta.is_user_member);
}

#[tokio::test]
async fn update_preserves_identity_fields() {
    let env = setup().await;
    let mut org = env
        .organizations
        .create(sample_org("Original Org"), "user-a")
        .await
        .expect("create");

    org.name = "Renamed Org".to_string();
    org.city = Some("Austin".to_string());
    org.slug = "tampered-slug".to_string();

    assert!(env.organizations.update(&org).await.expect("update"));

    let fetched = env
        .organizations
        .get_by_slug("original-org", None)
        .await
        .expect("fetch")
        .expect("slug unchanged");
    assert_eq!(fetched.name, "Renamed Org");
    assert_eq!(fetched.city.as_deref(), Some("Austin"));
    assert_eq!(fetched.created_by, "user-a");
    assert!(fetched.last_modified_date.is_some());
}
