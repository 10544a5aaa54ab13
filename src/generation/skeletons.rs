//! Canned playbooks: the named built-in skeletons and the deterministic
//! fallbacks used when no provider answers.

use super::GenerationContext;

const KUBERNETES_DEPLOYMENT: &str = r#"---
- name: Deploy to Kubernetes
  hosts: localhost
  gather_facts: no
  vars:
    namespace: "{{ namespace | default('default') }}"
    app_name: "{{ app_name }}"
    image: "{{ image }}"
    replicas: "{{ replicas | default(3) }}"

  tasks:
    - name: Create namespace
      kubernetes.core.k8s:
        name: "{{ namespace }}"
        api_version: v1
        kind: Namespace
        state: present

    - name: Deploy application
      kubernetes.core.k8s:
        definition:
          apiVersion: apps/v1
          kind: Deployment
          metadata:
            name: "{{ app_name }}"
            namespace: "{{ namespace }}"
          spec:
            replicas: "{{ replicas }}"
            selector:
              matchLabels:
                app: "{{ app_name }}"
            template:
              metadata:
                labels:
                  app: "{{ app_name }}"
              spec:
                containers:
                - name: "{{ app_name }}"
                  image: "{{ image }}"
                  ports:
                  - containerPort: 8080
"#;

const DOCKER_SETUP: &str = r#"---
- name: Setup Docker Environment
  hosts: all
  become: yes
  vars:
    docker_compose_version: "{{ compose_version | default('2.20.0') }}"

  tasks:
    - name: Update apt cache
      apt:
        update_cache: yes
      when: ansible_os_family == "Debian"

    - name: Install Docker dependencies
      package:
        name:
          - ca-certificates
          - curl
          - gnupg
          - lsb-release
        state: present

    - name: Add Docker GPG key
      ansible.builtin.apt_key:
        url: https://download.docker.com/linux/ubuntu/gpg
        state: present

    - name: Install Docker
      package:
        name: docker-ce
        state: present

    - name: Start Docker service
      service:
        name: docker
        state: started
        enabled: yes

    - name: Install Docker Compose Plugin
      package:
        name: docker-compose-plugin
        state: present
"#;

const SYSTEM_HARDENING: &str = r#"---
- name: System Security Hardening
  hosts: all
  become: yes

  tasks:
    - name: Update all packages
      package:
        name: '*'
        state: latest

    - name: Configure SSH
      lineinfile:
        path: /etc/ssh/sshd_config
        regexp: "{{ item.regexp }}"
        line: "{{ item.line }}"
      loop:
        - { regexp: '^PermitRootLogin', line: 'PermitRootLogin no' }
        - { regexp: '^PasswordAuthentication', line: 'PasswordAuthentication no' }
        - { regexp: '^PermitEmptyPasswords', line: 'PermitEmptyPasswords no' }
      notify: restart ssh

    - name: Configure firewall
      ufw:
        rule: allow
        port: "{{ item }}"
        proto: tcp
      loop:
        - 22
        - 443
        - 80

    - name: Enable firewall
      ufw:
        state: enabled

  handlers:
    - name: restart ssh
      service:
        name: sshd
        state: restarted
"#;

pub const SKELETON_NAMES: [&str; 3] = ["kubernetes_deployment", "docker_setup", "system_hardening"];

pub fn builtin_skeleton(name: &str) -> Option<&'static str> {
    match name {
        "kubernetes_deployment" => Some(KUBERNETES_DEPLOYMENT),
        "docker_setup" => Some(DOCKER_SETUP),
        "system_hardening" => Some(SYSTEM_HARDENING),
        _ => None,
    }
}

/// Characters a YAML stream may carry as-is.
fn printable(c: char) -> bool {
    !c.is_control() && !matches!(c, '\u{FFFE}' | '\u{FFFF}')
}

/// YAML double-quoted scalar; JSON string escaping is a subset of it.
/// JSON leaves DEL and C1 controls raw, so those get `\u` escapes too.
fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .chars()
        .map(|c| {
            if printable(c) {
                c.to_string()
            } else {
                format!("\\u{:04X}", c as u32)
            }
        })
        .collect()
}

/// Single comment-safe line: whitespace runs collapse, other
/// non-printable characters are dropped.
fn one_line(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.chars().filter(|c| printable(*c)).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tag_lines(context: &GenerationContext) -> String {
    let tags: Vec<&str> = if context.tags.is_empty() {
        vec!["main"]
    } else {
        context.tags.iter().map(String::as_str).collect()
    };
    tags.iter()
        .map(|tag| format!("        - {}", quoted(tag)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Always-valid playbook embedding the request. Same inputs, same text.
pub fn fallback_playbook(prompt: &str, context: &GenerationContext) -> String {
    format!(
        r#"---
# Generated playbook from prompt: {comment}
- name: {name}
  hosts: {hosts}
  become: yes
  vars:
    environment: {environment}

  tasks:
    - name: Ensure system is updated
      package:
        name: '*'
        state: latest
      tags:
        - update

    - name: Execute main task
      debug:
        msg: {msg}
      tags:
{tags}

    # Note: Using template-based generation. Configure AI provider for better results.
"#,
        comment = one_line(prompt),
        name = quoted(prompt),
        hosts = quoted(context.hosts()),
        environment = quoted(context.environment()),
        msg = quoted(&format!("Executing: {}", prompt)),
        tags = tag_lines(context),
    )
}

/// Fallback for template-assisted generation: shows which hints were
/// applied and the template's leading best practices.
pub fn enriched_fallback(
    prompt: &str,
    template_name: &str,
    context_hints: &[String],
    best_practices: &[String],
    context: &GenerationContext,
) -> String {
    let hints = context_hints
        .iter()
        .map(|hint| format!("# - {}", one_line(hint)))
        .collect::<Vec<_>>()
        .join("\n");
    let practices = best_practices
        .iter()
        .take(3)
        .map(|bp| format!("    # - {}", one_line(bp)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"---
# Generated using optimized prompt template
# Template: {template}
# Original prompt: {comment}
#
# Context hints applied:
{hints}

- name: {name}
  hosts: {hosts}
  become: yes
  vars:
    environment: {environment}

  tasks:
    - name: Gather facts
      setup:
      tags:
        - always

    - name: Execute main task based on requirements
      debug:
        msg: {msg}
      tags:
{tags}

    # Best practices from template:
{practices}
"#,
        template = one_line(template_name),
        comment = one_line(prompt),
        hints = hints,
        name = quoted(prompt),
        hosts = quoted(context.hosts()),
        environment = quoted(context.environment()),
        msg = quoted(&format!("Executing: {}", prompt)),
        tags = tag_lines(context),
        practices = practices,
    )
}
