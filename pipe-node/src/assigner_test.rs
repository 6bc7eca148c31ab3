use anyhow::Result;

use crate::assigner::ProgressIndexAssigner;
use crate::config::Config;
use crate::database::Database;
use pipe_core::index::SimpleProgressIndex;
use pipe_core::ProgressIndex;

#[tokio::test]
async fn reboot_counter_is_bumped_on_every_start() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let db = Database::new(config.clone()).await?;

    let first = ProgressIndexAssigner::new(&config, &db).await?;
    let second = ProgressIndexAssigner::new(&config, &db).await?;

    assert!(first.reboot_times() == 0, "expected first boot to have reboot times 0, got {}", first.reboot_times());
    assert!(second.reboot_times() == 1, "expected second boot to have reboot times 1, got {}", second.reboot_times());

    Ok(())
}

#[tokio::test]
async fn indices_of_a_later_boot_are_after_earlier_ones() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let db = Database::new(config.clone()).await?;

    let first = ProgressIndexAssigner::new(&config, &db).await?;
    let a = first.next_simple_index();
    let b = first.next_simple_index();
    let second = ProgressIndexAssigner::new(&config, &db).await?;
    let c = second.next_simple_index();

    assert_eq!(a, ProgressIndex::simple(0, 0));
    assert!(b.is_after(&a), "expected {} to be after {}", b, a);
    assert!(c.is_after(&b), "expected {} from a later boot to be after {}", c, b);

    Ok(())
}

#[tokio::test]
async fn recover_index_is_keyed_by_node() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let db = Database::new(config.clone()).await?;
    let assigner = ProgressIndexAssigner::new(&config, &db).await?;

    let _ = assigner.next_simple_index();
    let recover = assigner.recover_index();

    assert_eq!(recover, ProgressIndex::recover([(config.node_id, SimpleProgressIndex::new(0, 1))]));

    Ok(())
}
