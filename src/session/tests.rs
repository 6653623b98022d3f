use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::*;
use crate::config::SandboxConfig;
use crate::render::Preview;

const DEBOUNCE: Duration = Duration::from_millis(500);
const TEMPLATE: &str = "<p>@Model.Name</p>";

fn script(name: &str) -> String {
    format!("new {{ Name = \"{name}\" }}")
}

fn orchestrator() -> Arc<RenderOrchestrator> {
    Arc::new(RenderOrchestrator::from_config(&SandboxConfig::default()))
}

async fn rendered(orchestrator: &RenderOrchestrator) -> Preview {
    let mut rx = orchestrator.subscribe();
    let preview = rx
        .wait_for(|preview| matches!(preview.status, Status::Rendered(_)))
        .await
        .unwrap();
    preview.clone()
}

#[tokio::test(start_paused = true)]
async fn test_edit_burst_renders_once() {
    let orchestrator = orchestrator();
    let (tx, _handle) = spawn(Arc::clone(&orchestrator), DEBOUNCE, true);

    tx.send(SessionMsg::TemplateChanged(TEMPLATE.into())).await.unwrap();
    for i in 0..5 {
        tx.send(SessionMsg::ScriptChanged(script(&format!("n{i}"))))
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(orchestrator.latest_generation().get(), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(orchestrator.latest_generation().get(), 1);

    let preview = rendered(&orchestrator).await;
    assert!(preview.document.unwrap().contains("<p>n4</p>"));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_text_does_not_trigger() {
    let orchestrator = orchestrator();
    let (tx, _handle) = spawn(Arc::clone(&orchestrator), DEBOUNCE, true);

    tx.send(SessionMsg::ScriptChanged(String::new())).await.unwrap();
    tx.send(SessionMsg::TemplateChanged(String::new())).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.latest_generation().get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_render_off_waits_for_manual_render() {
    let orchestrator = orchestrator();
    let (tx, _handle) = spawn(Arc::clone(&orchestrator), DEBOUNCE, false);

    tx.send(SessionMsg::ScriptChanged(script("manual"))).await.unwrap();
    tx.send(SessionMsg::TemplateChanged(TEMPLATE.into())).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.latest_generation().get(), 0);

    tx.send(SessionMsg::RenderNow).await.unwrap();
    let preview = rendered(&orchestrator).await;
    assert_eq!(orchestrator.latest_generation().get(), 1);
    assert!(preview.document.unwrap().contains("<p>manual</p>"));
}

#[tokio::test(start_paused = true)]
async fn test_manual_render_consumes_pending_trigger() {
    let orchestrator = orchestrator();
    let (tx, _handle) = spawn(Arc::clone(&orchestrator), DEBOUNCE, true);

    tx.send(SessionMsg::ScriptChanged(script("a"))).await.unwrap();
    tx.send(SessionMsg::TemplateChanged(TEMPLATE.into())).await.unwrap();
    tx.send(SessionMsg::RenderNow).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.latest_generation().get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabling_drops_pending_trigger() {
    let orchestrator = orchestrator();
    let (tx, _handle) = spawn(Arc::clone(&orchestrator), DEBOUNCE, true);

    tx.send(SessionMsg::ScriptChanged(script("a"))).await.unwrap();
    tx.send(SessionMsg::SetAutoRender(false)).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.latest_generation().get(), 0);
    assert_eq!(orchestrator.preview().status, Status::AutoRenderOff);

    tx.send(SessionMsg::SetAutoRender(true)).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(orchestrator.preview().status, Status::AutoRenderOn);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_actor() {
    let (tx, handle) = spawn(orchestrator(), DEBOUNCE, true);
    tx.send(SessionMsg::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_senders_stops_actor() {
    let (tx, handle) = spawn(orchestrator(), DEBOUNCE, true);
    drop(tx);
    handle.await.unwrap();
}
