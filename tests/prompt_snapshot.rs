use text_extract_rust::render_extract_prompt;

#[test]
fn extract_prompt_snapshot() {
    let prompt = render_extract_prompt().unwrap();
    insta::assert_snapshot!(prompt);
}
