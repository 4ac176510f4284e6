fn main() {
    git_branches_invoke::invoke_subcommand_main(git_branches::commands::command_main)
}
