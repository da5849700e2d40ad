//! Integration tests for mailfill's page scripts.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test integration -- --ignored

use eoka::Browser;
use mailfill::fields::{fill_fields, locate_fields, probe_dropdowns};
use mailfill::{
    BrowserConfig, DropdownOptions, FieldOutcome, FieldType, ReviewedValue, Session, Timing,
};

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

fn fast_timing() -> Timing {
    Timing {
        settle_ms: 50,
        option_timeout_ms: 200,
        dropdown_timeout_ms: 300,
        poll_ms: 20,
    }
}

const FORM: &str = r#"data:text/html,
    <div><label for="name">Name</label><input id="name" type="text" placeholder="Your name" oninput="this.dataset.typed='yes'"></div>
    <input type="text" placeholder="Outside any container">
    <div><label>Email</label><input id="email" type="text" placeholder="Your email"></div>
    <div><input id="city" type="text" placeholder="City" aria-label="Town"></div>
    <div><input id="agree" type="checkbox" aria-label="Agree"></div>
    <p>Phone</p>
    <div><input id="phone" type="number"></div>
    <div><textarea id="notes"></textarea></div>
"#;

const FORM_LABELS: [&str; 6] = ["Name", "Email", "City", "Agree", "Phone", "Field 6"];

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_locate_fields_order_and_labels() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(FORM).await.expect("Failed to navigate");

    let fields = locate_fields(&page).await.expect("Failed to locate fields");

    // The uncontained input is dropped and indices stay dense
    let indices: Vec<usize> = fields.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);

    let labels: Vec<&str> = fields.iter().map(|f| f.label.as_str()).collect();
    // for-label, container label, placeholder, aria-label, previous sibling, fallback
    assert_eq!(labels, FORM_LABELS);

    assert_eq!(fields[0].field_type, FieldType::Text);
    assert_eq!(fields[3].field_type, FieldType::Checkbox);
    assert_eq!(fields[4].field_type, FieldType::Number);
    assert_eq!(fields[5].field_type, FieldType::Textarea);

    let marked: String = page
        .evaluate(r#"document.querySelector('[data-mailfill-field="5"]').id"#)
        .await
        .expect("Failed to read marker");
    assert_eq!(marked, "notes");

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_fill_fields_through_markers() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(FORM).await.expect("Failed to navigate");
    locate_fields(&page).await.expect("Failed to locate fields");

    let values = vec![
        ReviewedValue::new(0, "Alice"),
        ReviewedValue::new(3, "TRUE"),
        ReviewedValue::new(5, "Bring snacks"),
        ReviewedValue::new(7, "nowhere"),
    ];
    let report = fill_fields(&page, &values, &fast_timing())
        .await
        .expect("Failed to fill fields");

    assert_eq!(report.filled(), 3);
    assert_eq!(report.fields[3], (7, FieldOutcome::Missing));

    let name: String = page
        .evaluate("document.getElementById('name').value")
        .await
        .unwrap();
    assert_eq!(name, "Alice");
    let typed: String = page
        .evaluate("document.getElementById('name').dataset.typed || ''")
        .await
        .unwrap();
    assert_eq!(typed, "yes", "input event should fire");
    let checked: bool = page
        .evaluate("document.getElementById('agree').checked")
        .await
        .unwrap();
    assert!(checked);
    let notes: String = page
        .evaluate("document.getElementById('notes').value")
        .await
        .unwrap();
    assert_eq!(notes, "Bring snacks");

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_probe_dropdowns() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(
        r#"data:text/html,
        <div><input id="color" role="combobox" onclick="document.getElementById('list').style.display='block'"></div>
        <div><input role="combobox"></div>
        <div id="list" style="display:none"><div role="option">Red</div><div role="option">Blue</div></div>
        <script>
            document.body.addEventListener('click', e => {
                if (e.target === document.body) document.getElementById('list').style.display = 'none';
            });
        </script>
    "#,
    )
    .await
    .expect("Failed to navigate");

    let dropdowns = probe_dropdowns(&page, &fast_timing())
        .await
        .expect("Failed to probe dropdowns");

    // The second widget never renders options and is left out
    assert_eq!(
        dropdowns,
        vec![DropdownOptions {
            label: "color".into(),
            options: vec!["Red".into(), "Blue".into()],
        }]
    );

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_session_scan_and_fill() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let config = BrowserConfig {
        headless: true,
        ..Default::default()
    };
    let mut session = Session::launch(&config, fast_timing())
        .await
        .expect("Failed to launch session");
    session.open(FORM).await.expect("Failed to open form");

    let labels: Vec<String> = session
        .scan()
        .await
        .expect("Failed to scan")
        .iter()
        .map(|f| f.label.clone())
        .collect();
    assert_eq!(labels, FORM_LABELS);

    let report = session
        .fill(&[ReviewedValue::new(0, "Bob")])
        .await
        .expect("Failed to fill");
    assert!(report.is_complete());

    let name: String = session
        .page()
        .evaluate("document.getElementById('name').value")
        .await
        .unwrap();
    assert_eq!(name, "Bob");

    session.close().await.expect("Failed to close session");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_fill_confirms_new_options_only() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(
        r#"data:text/html,
        <div><input id="country" role="combobox" oninput="addOption(this.value)"></div>
        <div><input id="region" role="combobox"></div>
        <div id="stale" role="option" onclick="this.dataset.clicked='yes'">Stale</div>
        <script>
            function addOption(value) {
                const o = document.createElement('div');
                o.setAttribute('role', 'option');
                o.textContent = value.concat(' (match)');
                o.onclick = () => { document.getElementById('country').dataset.picked = o.textContent; };
                document.body.appendChild(o);
            }
        </script>
    "#,
    )
    .await
    .expect("Failed to navigate");
    locate_fields(&page).await.expect("Failed to locate fields");

    let values = vec![
        ReviewedValue::new(0, "Canada"),
        ReviewedValue::new(1, "Ontario"),
    ];
    let report = fill_fields(&page, &values, &fast_timing())
        .await
        .expect("Failed to fill fields");

    assert_eq!(
        report.fields,
        vec![
            (0, FieldOutcome::FilledWithOption("Canada (match)".into())),
            // The option added for the first field was already on the page
            (1, FieldOutcome::OptionTimeout),
        ]
    );

    let picked: String = page
        .evaluate("document.getElementById('country').dataset.picked || ''")
        .await
        .unwrap();
    assert_eq!(picked, "Canada (match)");
    let stale: String = page
        .evaluate("document.getElementById('stale').dataset.clicked || ''")
        .await
        .unwrap();
    assert_eq!(stale, "", "options present before the write must not be clicked");

    let seen: u32 = page
        .evaluate("document.querySelectorAll('[data-mailfill-seen]').length")
        .await
        .unwrap();
    assert_eq!(seen, 0);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_fill_error_still_clears_seen_tags() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(
        r#"data:text/html,
        <div><input id="trap" type="text"></div>
        <div role="option">Existing</div>
    "#,
    )
    .await
    .expect("Failed to navigate");
    locate_fields(&page).await.expect("Failed to locate fields");

    // Reading the field's type now throws inside the fill script
    page.execute(
        "Object.defineProperty(document.getElementById('trap'), 'type', { get() { throw new Error('broken field'); } })",
    )
    .await
    .expect("Failed to install trap");

    let result = fill_fields(&page, &[ReviewedValue::new(0, "x")], &fast_timing()).await;
    assert!(result.is_err());

    let seen: u32 = page
        .evaluate("document.querySelectorAll('[data-mailfill-seen]').length")
        .await
        .unwrap();
    assert_eq!(seen, 0);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_open_tolerates_busy_network() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let config = BrowserConfig {
        headless: true,
        ..Default::default()
    };
    let mut session = Session::launch(&config, fast_timing())
        .await
        .expect("Failed to launch session");

    // Keeps requesting forever, so the page never goes idle
    session
        .open(
            r#"data:text/html,
            <div><input type="text" placeholder="Search"></div>
            <script>setInterval(() => fetch('data:text/plain,x'), 100)</script>
        "#,
        )
        .await
        .expect("open should not fail when the network stays busy");

    let fields = session.scan().await.expect("Failed to scan");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].label, "Search");

    session.close().await.expect("Failed to close session");
}
