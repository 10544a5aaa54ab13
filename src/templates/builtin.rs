use chrono::{DateTime, Utc};

use super::{
    ContextEnrichment, FewShotExample, PromptTemplate, TemplateCategory, TemplateVersion,
};

const BASE_SYSTEM_PROMPT: &str = "You are an expert Ansible automation engineer. \
Produce a single, complete, production-ready Ansible playbook in YAML. \
Output only the YAML document, without markdown fences or commentary.";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct Seed {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: TemplateCategory,
    tags: &'static [&'static str],
    focus: &'static str,
    user_prompt: &'static str,
    example: (&'static str, &'static str),
    steps: &'static [&'static str],
    best_practices: &'static [&'static str],
    hints: &'static [&'static str],
}

impl Seed {
    fn build(&self, now: DateTime<Utc>) -> PromptTemplate {
        PromptTemplate {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            version: TemplateVersion::INITIAL,
            category: self.category,
            tags: strings(self.tags),
            system_prompt: format!("{} {}", BASE_SYSTEM_PROMPT, self.focus),
            user_prompt_template: self.user_prompt.to_string(),
            few_shot_examples: vec![FewShotExample {
                input: self.example.0.to_string(),
                output: self.example.1.to_string(),
            }],
            chain_of_thought: strings(self.steps),
            context_enrichment: ContextEnrichment {
                best_practices: strings(self.best_practices),
                context_hints: strings(self.hints),
            },
            updated_at: now,
        }
    }
}

const SEEDS: &[Seed] = &[
    Seed {
        id: "k8s-deploy",
        name: "Kubernetes Deployment",
        description: "Deploy containerized applications to a Kubernetes cluster",
        category: TemplateCategory::Kubernetes,
        tags: &["kubernetes", "k8s", "deployment", "containers"],
        focus: "You specialize in kubernetes.core modules and declarative cluster resources.",
        user_prompt: "{prompt}\n\nNamespace: {namespace}\nReplicas: {replicas}",
        example: (
            "Deploy nginx with 3 replicas to the web namespace",
            "---\n- name: Deploy nginx\n  hosts: localhost\n  gather_facts: no\n  tasks:\n    - name: Create deployment\n      kubernetes.core.k8s:\n        state: present\n        definition:\n          apiVersion: apps/v1\n          kind: Deployment\n          metadata:\n            name: nginx\n            namespace: web\n          spec:\n            replicas: 3\n            selector:\n              matchLabels:\n                app: nginx\n            template:\n              metadata:\n                labels:\n                  app: nginx\n              spec:\n                containers:\n                  - name: nginx\n                    image: nginx:1.25\n",
        ),
        steps: &[
            "Identify the workload, image and target namespace",
            "Ensure the namespace exists before creating resources",
            "Define the Deployment with resource limits and probes",
            "Expose the workload with a Service if it accepts traffic",
            "Wait for the rollout to complete",
        ],
        best_practices: &[
            "Use kubernetes.core.k8s with state: present for idempotency",
            "Pin image tags instead of using latest",
            "Set resource requests and limits on every container",
            "Add readiness and liveness probes",
            "Keep secrets in Kubernetes Secrets or Ansible Vault",
        ],
        hints: &[
            "Target the cluster from localhost with gather_facts disabled",
            "Parameterize namespace and replica count as variables",
        ],
    },
    Seed {
        id: "docker-setup",
        name: "Docker Environment Setup",
        description: "Install and configure Docker engine and container services",
        category: TemplateCategory::Docker,
        tags: &["docker", "containers", "compose"],
        focus: "You specialize in Docker engine installation and container lifecycle modules.",
        user_prompt: "{prompt}\n\nTarget hosts: {target_hosts}",
        example: (
            "Install Docker and run a redis container",
            "---\n- name: Run redis in Docker\n  hosts: all\n  become: yes\n  tasks:\n    - name: Install Docker\n      package:\n        name: docker-ce\n        state: present\n    - name: Start Docker\n      service:\n        name: docker\n        state: started\n        enabled: yes\n    - name: Run redis\n      community.docker.docker_container:\n        name: redis\n        image: redis:7\n        restart_policy: unless-stopped\n        ports:\n          - \"6379:6379\"\n",
        ),
        steps: &[
            "Install Docker prerequisites for the host OS family",
            "Install and enable the Docker engine",
            "Configure daemon options if required",
            "Deploy containers with explicit images and restart policies",
        ],
        best_practices: &[
            "Use community.docker modules instead of shell commands",
            "Pin container image versions",
            "Set a restart policy for long-running containers",
            "Guard distribution-specific tasks with when conditions",
        ],
        hints: &[
            "Run with become: yes for package installation",
            "Prefer the compose plugin over the legacy docker-compose binary",
        ],
    },
    Seed {
        id: "security-hardening",
        name: "System Security Hardening",
        description: "Harden Linux hosts: SSH, firewall, updates and auditing",
        category: TemplateCategory::Security,
        tags: &["security", "hardening", "ssh", "firewall", "compliance"],
        focus: "You specialize in CIS-style Linux hardening.",
        user_prompt: "{prompt}\n\nCompliance baseline: {baseline}",
        example: (
            "Disable root SSH login and enable the firewall",
            "---\n- name: Harden SSH and firewall\n  hosts: all\n  become: yes\n  tasks:\n    - name: Disable root login\n      lineinfile:\n        path: /etc/ssh/sshd_config\n        regexp: '^PermitRootLogin'\n        line: 'PermitRootLogin no'\n      notify: restart ssh\n    - name: Enable firewall\n      ufw:\n        state: enabled\n        policy: deny\n  handlers:\n    - name: restart ssh\n      service:\n        name: sshd\n        state: restarted\n",
        ),
        steps: &[
            "Apply pending security updates",
            "Lock down SSH authentication",
            "Configure a default-deny firewall with required ports",
            "Enable auditing and log retention",
            "Restart affected services through handlers",
        ],
        best_practices: &[
            "Validate sshd_config before restarting the service",
            "Use handlers for service restarts",
            "Never disable password login before key access is confirmed",
            "Keep firewall rules explicit and minimal",
        ],
        hints: &[
            "Allow the SSH port before enabling the firewall",
            "Tag tasks by control area for selective runs",
        ],
    },
    Seed {
        id: "database-setup",
        name: "Database Server Setup",
        description: "Install and configure relational or key-value database servers",
        category: TemplateCategory::Database,
        tags: &["database", "postgresql", "mysql", "redis"],
        focus: "You specialize in database installation, users and backups.",
        user_prompt: "{prompt}\n\nDatabase engine: {engine}",
        example: (
            "Install PostgreSQL and create an app database",
            "---\n- name: Set up PostgreSQL\n  hosts: db\n  become: yes\n  tasks:\n    - name: Install PostgreSQL\n      package:\n        name: postgresql\n        state: present\n    - name: Create database\n      community.postgresql.postgresql_db:\n        name: app\n      become_user: postgres\n",
        ),
        steps: &[
            "Install the database server packages",
            "Apply configuration tuned to the host",
            "Create databases and least-privilege users",
            "Schedule backups",
        ],
        best_practices: &[
            "Store database passwords in Ansible Vault",
            "Use the engine's dedicated collection modules",
            "Bind to private interfaces only",
            "Configure automated backups",
        ],
        hints: &[
            "Run administrative tasks as the database system user",
            "Mark credential-handling tasks with no_log: true",
        ],
    },
    Seed {
        id: "monitoring-stack",
        name: "Monitoring Stack",
        description: "Deploy metrics collection, dashboards and alerting",
        category: TemplateCategory::Monitoring,
        tags: &["monitoring", "prometheus", "grafana", "alerting"],
        focus: "You specialize in Prometheus, exporters and Grafana.",
        user_prompt: "{prompt}\n\nScrape targets: {targets}",
        example: (
            "Install node_exporter on all hosts",
            "---\n- name: Install node_exporter\n  hosts: all\n  become: yes\n  tasks:\n    - name: Install exporter\n      package:\n        name: prometheus-node-exporter\n        state: present\n    - name: Start exporter\n      service:\n        name: prometheus-node-exporter\n        state: started\n        enabled: yes\n",
        ),
        steps: &[
            "Install exporters on monitored hosts",
            "Configure the metrics server and scrape jobs",
            "Provision dashboards",
            "Define alert rules and notification routes",
        ],
        best_practices: &[
            "Template scrape configuration from inventory groups",
            "Restrict exporter ports to the monitoring network",
            "Version dashboards alongside the playbook",
        ],
        hints: &["Reload the metrics server through a handler after config changes"],
    },
    Seed {
        id: "cicd-pipeline",
        name: "CI/CD Pipeline Infrastructure",
        description: "Provision build agents and deployment pipeline tooling",
        category: TemplateCategory::Cicd,
        tags: &["cicd", "jenkins", "gitlab", "pipeline"],
        focus: "You specialize in build agents and delivery pipeline tooling.",
        user_prompt: "{prompt}\n\nCI system: {ci_system}",
        example: (
            "Register a GitLab runner",
            "---\n- name: Install GitLab runner\n  hosts: runners\n  become: yes\n  tasks:\n    - name: Install runner\n      package:\n        name: gitlab-runner\n        state: present\n    - name: Start runner\n      service:\n        name: gitlab-runner\n        state: started\n        enabled: yes\n",
        ),
        steps: &[
            "Install the CI agent and its toolchain",
            "Register the agent with the CI server",
            "Configure credentials for artifact and deploy targets",
            "Verify the agent is online",
        ],
        best_practices: &[
            "Keep registration tokens in Ansible Vault",
            "Make registration idempotent with creates or a state check",
            "Isolate build agents from production networks",
        ],
        hints: &["Use no_log: true on tasks that handle tokens"],
    },
];

pub(super) fn builtin_templates(now: DateTime<Utc>) -> Vec<PromptTemplate> {
    SEEDS.iter().map(|seed| seed.build(now)).collect()
}
