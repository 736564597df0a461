mod common;

use common::{sample_work, setup};

#[tokio::test]
async fn skills_deduplicate_case_insensitively() {
    let env = setup().await;

    let first = env
        .skills
        .get_or_create("Web Development", Some("Technical"), None)
        .await
        .expect("create");
    let second = env
        .skills
        .get_or_create("  web   DEVELOPMENT ", None, None)
        .await
        .expect("match");

    // The stored casing is the first writer's.
    assert_eq!(first.name, "Web Development");
    assert_eq!(second.name, "Web Development");
    assert_eq!(second.category.as_deref(), Some("Technical"));

    let all = env.skills.all_skills().await.expect("list");
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn empty_skill_name_is_a_validation_error() {
    let env = setup().await;
    let result = env.skills.get_or_create("   ", None, None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn usage_counts_come_from_inbound_edges() {
    let env = setup().await;

    let mut work = sample_work("Skilled Work");
    work.required_skills = vec!["Gardening".to_string()];
    env.works.create(&work, "user-a").await.expect("create");
    env.skills
        .add_user_skill("user-b", "gardening")
        .await
        .expect("user skill");

    let all = env.skills.all_skills().await.expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Gardening");
    assert_eq!(all[0].usage_count, 2);
}

#[tokio::test]
async fn user_skill_lifecycle() {
    let env = setup().await;

    assert!(env
        .skills
        .add_user_skill("user-a", "First Aid")
        .await
        .expect("add"));
    // Re-adding the same skill changes nothing.
    assert!(!env
        .skills
        .add_user_skill("user-a", "first aid")
        .await
        .expect("re-add"));
    env.skills
        .add_user_skill("user-a", "Spanish")
        .await
        .expect("add");

    let names = env.skills.user_skills("user-a").await.expect("list");
    assert_eq!(names, vec!["First Aid", "Spanish"]);

    assert!(env
        .skills
        .remove_user_skill("user-a", "FIRST AID")
        .await
        .expect("remove"));
    assert!(!env
        .skills
        .remove_user_skill("user-a", "First Aid")
        .await
        .expect("remove again"));

    let names = env.skills.user_skills("user-a").await.expect("list");
    assert_eq!(names, vec!["Spanish"]);
}

#[tokio::test]
async fn search_matches_name_and_description() {
    let env = setup().await;
    env.skills
        .get_or_create("Grant Writing", Some("Specialized"), Some("Drafting funding proposals"))
        .await
        .expect("create");
    env.skills
        .get_or_create("Cooking & Baking", Some("Creative"), None)
        .await
        .expect("create");

    let by_name = env.skills.search("grant").await.expect("search");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].name, "Grant Writing");

    let by_description = env.skills.search("funding").await.expect("search");
    assert_eq!(by_description.len(), 1);

    let blank = env.skills.search("  ").await.expect("search");
    assert_eq!(blank.len(), 2, "blank term falls back to the catalog");
}
